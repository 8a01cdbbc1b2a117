//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, borrows, health, users};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Lending API",
        version = "1.0.0",
        description = "Catalog, membership and borrow ledger. Every response is wrapped in \
                       {status, message, data} on success and {status, message, error} on failure."
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        auth::change_password,
        // Books
        books::list_books,
        books::get_book,
        books::get_book_by_isbn,
        books::search_books,
        books::available_books,
        books::books_by_category,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Users
        users::list_users,
        users::search_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        // Borrows
        borrows::borrow_book,
        borrows::list_borrows,
        borrows::active_borrows,
        borrows::overdue_borrows,
        borrows::refresh_overdue,
        borrows::user_borrows,
        borrows::user_history,
        borrows::book_borrows,
        borrows::get_borrow,
        borrows::update_borrow,
        borrows::return_book,
    ),
    components(
        schemas(
            // Auth
            auth::AuthResponse,
            crate::models::user::LoginRequest,
            crate::models::user::RegisterUser,
            crate::models::user::ChangePassword,
            // Books
            crate::models::book::Book,
            crate::models::book::BookSummary,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Users
            crate::models::user::Role,
            crate::models::user::User,
            crate::models::user::UserSummary,
            crate::models::user::UserQuery,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            // Borrows
            crate::models::borrow::BorrowStatus,
            crate::models::borrow::BorrowDetails,
            crate::models::borrow::CreateBorrow,
            crate::models::borrow::ReturnBorrow,
            crate::models::borrow::UpdateBorrow,
            crate::models::borrow::SweepReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "users", description = "Member management"),
        (name = "borrows", description = "Borrow ledger")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
