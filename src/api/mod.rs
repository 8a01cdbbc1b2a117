//! API handlers for the library REST endpoints

pub mod auth;
pub mod books;
pub mod borrows;
pub mod health;
pub mod openapi;
pub mod users;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    routing::{get, post, put},
    Json, RequestPartsExt, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::Principal, AppState};

/// Extractor for the authenticated caller.
///
/// The bearer token is verified and its account loaded from the store, so a
/// deactivated or deleted account is rejected even with a live token.
pub struct AuthenticatedUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Authentication("Missing or invalid bearer token".to_string()))?;

        let principal = state
            .services
            .users
            .principal_from_token(bearer.token())
            .await?;

        Ok(AuthenticatedUser(principal))
    }
}

/// JSON body whose rejection uses the error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// JSON body that may be omitted entirely.
///
/// An empty body yields `T::default()`; anything else must parse as `T`.
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            AppError::Validation(format!("Invalid request body: {}", e.body_text()))
        })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(T::default()));
        }

        serde_json::from_slice(&bytes)
            .map(OptionalJson)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
    }
}

/// Path parameters whose rejection uses the error envelope
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Query string whose rejection uses the error envelope
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always "success"
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Envelope without a payload
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: None,
        }
    }
}

/// 200 with the envelope
pub fn ok<T: Serialize>(message: &str, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(message, data))
}

/// 201 with the envelope
pub fn created<T: Serialize>(message: &str, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(message, data)))
}

/// Unknown routes still answer with the error envelope
async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/search", get(books::search_books))
        .route("/books/available", get(books::available_books))
        .route("/books/isbn/:isbn", get(books::get_book_by_isbn))
        .route("/books/category/:category", get(books::books_by_category))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/search", get(users::search_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Borrows
        .route("/borrows", get(borrows::list_borrows).post(borrows::borrow_book))
        .route("/borrows/active", get(borrows::active_borrows))
        .route("/borrows/overdue", get(borrows::overdue_borrows))
        .route("/borrows/overdue/refresh", post(borrows::refresh_overdue))
        .route("/borrows/user/:user_id", get(borrows::user_borrows))
        .route("/borrows/user/:user_id/history", get(borrows::user_history))
        .route("/borrows/book/:book_id", get(borrows::book_borrows))
        .route(
            "/borrows/:id",
            get(borrows::get_borrow).put(borrows::update_borrow),
        )
        .route("/borrows/:id/return", put(borrows::return_book));

    Router::new()
        .nest("/api/v1", api_v1)
        .with_state(state)
        .merge(openapi::create_openapi_router())
        .fallback(route_not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
