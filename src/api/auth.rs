//! Authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{ChangePassword, LoginRequest, RegisterUser, User},
};

use super::{created, ok, ApiJson, ApiResponse, AuthenticatedUser};

/// Token issued on login or registration
#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    /// Always "Bearer"
    pub token_type: String,
    pub user: User,
}

impl AuthResponse {
    fn new(token: String, user: User) -> Self {
        Self {
            token,
            token_type: "Bearer".to_string(),
            user,
        }
    }
}

/// Register a member account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or email already used", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<crate::AppState>,
    ApiJson(request): ApiJson<RegisterUser>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    let (token, user) = state.services.users.register(request).await?;
    Ok(created("Registration successful", AuthResponse::new(token, user)))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or deactivated account", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let (token, user) = state.services.users.authenticate(request).await?;
    Ok(ok("Login successful", AuthResponse::new(token, user)))
}

/// Get current user info
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = state.services.users.get_user(principal.user_id).await?;
    Ok(ok("Profile retrieved successfully", user))
}

/// Change the caller's password
#[utoipa::path(
    put,
    path = "/auth/password",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = ChangePassword,
    responses(
        (status = 200, description = "Password changed"),
        (status = 401, description = "Current password is wrong", body = crate::error::ErrorResponse)
    )
)]
pub async fn change_password(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    ApiJson(request): ApiJson<ChangePassword>,
) -> AppResult<Json<ApiResponse<()>>> {
    state
        .services
        .users
        .change_password(principal.user_id, request)
        .await?;
    Ok(Json(ApiResponse::message("Password changed successfully")))
}
