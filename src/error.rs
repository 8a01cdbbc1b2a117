//! Error types for the library server

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes exposed in the `error` field of the response envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotAuthenticated,
    Forbidden,
    NotFound,
    Conflict,
    BadValue,
    DbFailure,
    Failure,
    UserNotFound,
    UserInactive,
    BookNotFound,
    BookInactive,
    BookUnavailable,
    DuplicateActiveBorrow,
    BorrowNotFound,
    NotCurrentlyBorrowed,
    HasActiveBorrows,
}

/// Coarse classification of lending failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
}

/// Business rule violations raised by the borrow/return workflow and
/// by deletions guarded by the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LendingError {
    #[error("User not found")]
    UserNotFound,

    #[error("User is not active")]
    UserInactive,

    #[error("Book not found")]
    BookNotFound,

    #[error("Book is not active")]
    BookInactive,

    #[error("Book is not available for borrowing")]
    BookUnavailable,

    #[error("User already has an active borrow for this book")]
    DuplicateActiveBorrow,

    #[error("Borrow record not found")]
    BorrowNotFound,

    #[error("Book is not currently borrowed")]
    NotCurrentlyBorrowed,

    #[error("Cannot delete a record with active borrows")]
    HasActiveBorrows,
}

impl LendingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::UserNotFound
            | LendingError::BookNotFound
            | LendingError::BorrowNotFound => ErrorKind::NotFound,
            LendingError::DuplicateActiveBorrow => ErrorKind::Conflict,
            LendingError::UserInactive
            | LendingError::BookInactive
            | LendingError::BookUnavailable
            | LendingError::NotCurrentlyBorrowed
            | LendingError::HasActiveBorrows => ErrorKind::InvalidState,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            LendingError::UserNotFound => ErrorCode::UserNotFound,
            LendingError::UserInactive => ErrorCode::UserInactive,
            LendingError::BookNotFound => ErrorCode::BookNotFound,
            LendingError::BookInactive => ErrorCode::BookInactive,
            LendingError::BookUnavailable => ErrorCode::BookUnavailable,
            LendingError::DuplicateActiveBorrow => ErrorCode::DuplicateActiveBorrow,
            LendingError::BorrowNotFound => ErrorCode::BorrowNotFound,
            LendingError::NotCurrentlyBorrowed => ErrorCode::NotCurrentlyBorrowed,
            LendingError::HasActiveBorrows => ErrorCode::HasActiveBorrows,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Lending(#[from] LendingError),
}

impl AppError {
    /// Returns the lending rule this error carries, if any
    pub fn lending(&self) -> Option<&LendingError> {
        match self {
            AppError::Lending(e) => Some(e),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(format!("Invalid query string: {}", rejection.body_text()))
    }
}

/// Error envelope returned by every failing endpoint
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always "error"
    pub status: &'static str,
    pub message: String,
    /// Stable error code
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthenticated, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::Forbidden, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NotFound, msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::BAD_REQUEST, ErrorCode::Conflict, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
            AppError::Lending(e) => {
                let status = match e.kind() {
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Conflict | ErrorKind::InvalidState => StatusCode::BAD_REQUEST,
                };
                (status, e.code(), e.to_string())
            }
        };

        let body = Json(ErrorResponse {
            status: "error",
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

/// Returns true when the error is a unique-constraint violation on the given index
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505") && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lending_errors_are_classified() {
        assert_eq!(LendingError::UserNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(LendingError::DuplicateActiveBorrow.kind(), ErrorKind::Conflict);
        assert_eq!(LendingError::BookUnavailable.kind(), ErrorKind::InvalidState);
        assert_eq!(LendingError::HasActiveBorrows.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        let cases = [
            (AppError::from(LendingError::BorrowNotFound), StatusCode::NOT_FOUND),
            (AppError::from(LendingError::BookUnavailable), StatusCode::BAD_REQUEST),
            (AppError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Authorization("x".into()), StatusCode::FORBIDDEN),
            (AppError::Conflict("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
