//! Error types for Libris server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Stable application error codes, returned alongside the HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchUser = 4,
    NoSuchItem = 5,
    ItemNotAvailable = 7,
    Duplicate = 8,
    BadValue = 18,
    ItemNotBorrowed = 22,
    NotHolder = 23,
    StoreUnavailable = 24,
}

/// Failures of token encoding and verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid signing key configuration: {0}")]
    KeyConfiguration(String),
}

/// Business conflicts raised by the lending state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LendingError {
    #[error("Borrower '{0}' is not a known user")]
    UnknownHolder(String),

    #[error("Book {0} is already checked out")]
    ItemUnavailable(i64),

    #[error("Book {0} is not checked out")]
    ItemNotCheckedOut(i64),

    #[error("Book {0} is held by another user")]
    NotHolder(i64),

    #[error("Book {0} was modified concurrently")]
    VersionConflict(i64),
}

/// A single rejected request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
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

    #[error("Invalid fields: {0:?}")]
    InvalidFields(Vec<FieldError>),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error(transparent)]
    Lending(#[from] LendingError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchItem),
            AppError::InvalidFields(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreUnavailable)
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure),
            AppError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreUnavailable)
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Duplicate),
            AppError::Token(TokenError::KeyConfiguration(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure)
            }
            AppError::Token(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Lending(e) => match e {
                LendingError::UnknownHolder(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NoSuchUser),
                LendingError::ItemUnavailable(_) | LendingError::VersionConflict(_) => {
                    (StatusCode::CONFLICT, ErrorCode::ItemNotAvailable)
                }
                LendingError::ItemNotCheckedOut(_) => (StatusCode::CONFLICT, ErrorCode::ItemNotBorrowed),
                LendingError::NotHolder(_) => (StatusCode::CONFLICT, ErrorCode::NotHolder),
            },
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }

    /// HTTP status this error is rendered with
    pub fn status(&self) -> StatusCode {
        self.status_and_code().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, fields) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                ("Database error".to_string(), Vec::new())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error".to_string(), Vec::new())
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                ("Service temporarily unavailable".to_string(), Vec::new())
            }
            AppError::Token(TokenError::KeyConfiguration(msg)) => {
                tracing::error!("Signing key misconfigured: {}", msg);
                ("Internal server error".to_string(), Vec::new())
            }
            AppError::InvalidFields(fields) => ("Request validation failed".to_string(), fields),
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => (msg, Vec::new()),
            other => (other.to_string(), Vec::new()),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            fields,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
