//! User management endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::user::{CreateUser, UpdateUser, User, UserQuery},
};

use super::{created, ok, ApiJson, ApiPath, ApiQuery, ApiResponse, AuthenticatedUser};

/// List active users
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active users", body = Vec<User>),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    principal.require_staff()?;

    let users = state.services.users.list_users().await?;
    Ok(ok("Users retrieved successfully", users))
}

/// Search users by name, email or phone
#[utoipa::path(
    get,
    path = "/users/search",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "Matching users", body = Vec<User>),
        (status = 400, description = "Missing search query", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    principal.require_staff()?;

    let users = state.services.users.search_users(query.q).await?;
    Ok(ok("Users retrieved successfully", users))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 403, description = "Another member's account", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<User>>> {
    principal.require_self_or_staff(id)?;

    let user = state.services.users.get_user(id).await?;
    Ok(ok("User retrieved successfully", user))
}

/// Create a user with any role
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input or email already used", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateUser>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    principal.require_admin()?;

    let user = state.services.users.create_user(request).await?;
    Ok(created("User created successfully", user))
}

/// Update an existing user
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
    ApiJson(request): ApiJson<UpdateUser>,
) -> AppResult<Json<ApiResponse<User>>> {
    principal.require_admin()?;

    let user = state.services.users.update_user(id, request).await?;
    Ok(ok("User updated successfully", user))
}

/// Soft-delete a user
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "Books still on loan", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    principal.require_admin()?;

    state.services.users.delete_user(id).await?;
    Ok(Json(ApiResponse::message("User deleted successfully")))
}
