//! Borrow ledger endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::borrow::{BorrowDetails, CreateBorrow, ReturnBorrow, SweepReport, UpdateBorrow},
};

use super::{created, ok, ApiJson, ApiPath, ApiResponse, AuthenticatedUser, OptionalJson};

/// Lend a book to a member
#[utoipa::path(
    post,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = CreateBorrow,
    responses(
        (status = 201, description = "Borrow created", body = BorrowDetails),
        (status = 400, description = "Inactive user or book, no copy available, or already borrowed", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateBorrow>,
) -> AppResult<(StatusCode, Json<ApiResponse<BorrowDetails>>)> {
    principal.require_staff()?;

    let borrow = state.services.lending.borrow_book(request).await?;
    Ok(created("Book borrowed successfully", borrow))
}

/// List every borrow record
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All borrows", body = Vec<BorrowDetails>)
    )
)]
pub async fn list_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<Vec<BorrowDetails>>>> {
    principal.require_staff()?;

    let borrows = state.services.lending.list_borrows().await?;
    Ok(ok("Borrows retrieved successfully", borrows))
}

/// Borrows currently on loan
#[utoipa::path(
    get,
    path = "/borrows/active",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Borrowed or overdue records", body = Vec<BorrowDetails>)
    )
)]
pub async fn active_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<Vec<BorrowDetails>>>> {
    principal.require_staff()?;

    let borrows = state.services.lending.active_borrows().await?;
    Ok(ok("Active borrows retrieved successfully", borrows))
}

/// Borrows past their due date
#[utoipa::path(
    get,
    path = "/borrows/overdue",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue records", body = Vec<BorrowDetails>)
    )
)]
pub async fn overdue_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<Vec<BorrowDetails>>>> {
    principal.require_staff()?;

    let borrows = state.services.lending.overdue_borrows().await?;
    Ok(ok("Overdue borrows retrieved successfully", borrows))
}

/// Run the overdue sweep now
#[utoipa::path(
    post,
    path = "/borrows/overdue/refresh",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep result", body = SweepReport)
    )
)]
pub async fn refresh_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<SweepReport>>> {
    principal.require_staff()?;

    let report = state.services.lending.update_overdue_status().await?;
    Ok(ok("Overdue status updated", report))
}

/// Borrows of one member
#[utoipa::path(
    get,
    path = "/borrows/user/{user_id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "The member's borrows", body = Vec<BorrowDetails>),
        (status = 403, description = "Another member's records", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn user_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(user_id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<Vec<BorrowDetails>>>> {
    principal.require_self_or_staff(user_id)?;

    let borrows = state.services.lending.borrows_by_user(user_id).await?;
    Ok(ok("User borrows retrieved successfully", borrows))
}

/// Borrow history of one member, newest first
#[utoipa::path(
    get,
    path = "/borrows/user/{user_id}/history",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "The member's borrow history", body = Vec<BorrowDetails>),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn user_history(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(user_id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<Vec<BorrowDetails>>>> {
    principal.require_self_or_staff(user_id)?;

    let borrows = state.services.lending.borrow_history(user_id).await?;
    Ok(ok("Borrow history retrieved successfully", borrows))
}

/// Borrows of one book
#[utoipa::path(
    get,
    path = "/borrows/book/{book_id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "The book's borrows", body = Vec<BorrowDetails>),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn book_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(book_id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<Vec<BorrowDetails>>>> {
    principal.require_staff()?;

    let borrows = state.services.lending.borrows_by_book(book_id).await?;
    Ok(ok("Book borrows retrieved successfully", borrows))
}

/// Get a borrow record; members only see their own
#[utoipa::path(
    get,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID")
    ),
    responses(
        (status = 200, description = "Borrow details", body = BorrowDetails),
        (status = 403, description = "Another member's borrow", body = crate::error::ErrorResponse),
        (status = 404, description = "Borrow not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<BorrowDetails>>> {
    let borrow = state.services.lending.get_borrow(&principal, id).await?;
    Ok(ok("Borrow retrieved successfully", borrow))
}

/// Correct a borrow: due date, fine, notes, or mark the copy lost
#[utoipa::path(
    put,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID")
    ),
    request_body = UpdateBorrow,
    responses(
        (status = 200, description = "Borrow updated", body = BorrowDetails),
        (status = 400, description = "Status change not allowed", body = crate::error::ErrorResponse),
        (status = 404, description = "Borrow not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(request): ApiJson<UpdateBorrow>,
) -> AppResult<Json<ApiResponse<BorrowDetails>>> {
    principal.require_staff()?;

    let borrow = state.services.lending.update_borrow(id, request).await?;
    Ok(ok("Borrow updated successfully", borrow))
}

/// Return a borrowed (or overdue) book
#[utoipa::path(
    put,
    path = "/borrows/{id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID")
    ),
    request_body = ReturnBorrow,
    responses(
        (status = 200, description = "Book returned", body = BorrowDetails),
        (status = 400, description = "Malformed body or not currently borrowed", body = crate::error::ErrorResponse),
        (status = 404, description = "Borrow not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
    OptionalJson(request): OptionalJson<ReturnBorrow>,
) -> AppResult<Json<ApiResponse<BorrowDetails>>> {
    principal.require_staff()?;

    let borrow = state.services.lending.return_book(id, request).await?;
    Ok(ok("Book returned successfully", borrow))
}
