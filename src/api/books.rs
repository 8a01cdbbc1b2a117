//! Catalog endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::book::{Book, BookQuery, CreateBook, UpdateBook},
};

use super::{created, ok, ApiJson, ApiPath, ApiQuery, ApiResponse, AuthenticatedUser};

/// List active books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active books", body = Vec<Book>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<Vec<Book>>>> {
    let books = state.services.catalog.list_books().await?;
    Ok(ok("Books retrieved successfully", books))
}

/// Get book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<Book>>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(ok("Book retrieved successfully", book))
}

#[utoipa::path(
    get,
    path = "/books/isbn/{isbn}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "ISBN")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book_by_isbn(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
    ApiPath(isbn): ApiPath<String>,
) -> AppResult<Json<ApiResponse<Book>>> {
    let book = state.services.catalog.get_book_by_isbn(&isbn).await?;
    Ok(ok("Book retrieved successfully", book))
}

/// Search books by title, author, ISBN or category
#[utoipa::path(
    get,
    path = "/books/search",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = Vec<Book>),
        (status = 400, description = "Missing search query", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
    ApiQuery(query): ApiQuery<BookQuery>,
) -> AppResult<Json<ApiResponse<Vec<Book>>>> {
    let books = state.services.catalog.search_books(query.q).await?;
    Ok(ok("Books retrieved successfully", books))
}

/// Books with at least one copy on the shelf
#[utoipa::path(
    get,
    path = "/books/available",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Available books", body = Vec<Book>)
    )
)]
pub async fn available_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<Vec<Book>>>> {
    let books = state.services.catalog.available_books().await?;
    Ok(ok("Available books retrieved successfully", books))
}

/// Books in a category (case-insensitive)
#[utoipa::path(
    get,
    path = "/books/category/{category}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("category" = String, Path, description = "Category name")
    ),
    responses(
        (status = 200, description = "Books in the category", body = Vec<Book>)
    )
)]
pub async fn books_by_category(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
    ApiPath(category): ApiPath<String>,
) -> AppResult<Json<ApiResponse<Vec<Book>>>> {
    let books = state.services.catalog.books_by_category(&category).await?;
    Ok(ok("Books retrieved successfully", books))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input or duplicate ISBN", body = crate::error::ErrorResponse),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateBook>,
) -> AppResult<(StatusCode, Json<ApiResponse<Book>>)> {
    principal.require_staff()?;

    let book = state.services.catalog.create_book(request).await?;
    Ok(created("Book created successfully", book))
}

/// Update a book; a stock change keeps copies on loan accounted for
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(request): ApiJson<UpdateBook>,
) -> AppResult<Json<ApiResponse<Book>>> {
    principal.require_staff()?;

    let book = state.services.catalog.update_book(id, request).await?;
    Ok(ok("Book updated successfully", book))
}

/// Soft-delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book deleted"),
        (status = 400, description = "Copies still on loan", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    principal.require_admin()?;

    state.services.catalog.delete_book(id).await?;
    Ok(Json(ApiResponse::message("Book deleted successfully")))
}
