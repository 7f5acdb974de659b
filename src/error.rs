//! Error types for the storefront
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::error::ErrorKind;
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Access denied (403)
    #[error("Access denied")]
    Forbidden,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflicting row already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Object storage error (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Token signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing key error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    /// Constraint violations come from user input reaching the check
    /// constraints, so they are reported as client errors.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                ErrorKind::UniqueViolation => {
                    return AppError::Conflict(db_err.message().to_string());
                }
                ErrorKind::ForeignKeyViolation => {
                    return AppError::Validation("referenced record does not exist".to_string());
                }
                ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                    return AppError::Validation(db_err.message().to_string());
                }
                _ => {}
            }
        }
        AppError::Database(err)
    }
}

impl AppError {
    /// Short machine-readable label used for metrics.
    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::Database(_) => "database",
            AppError::Storage(_) => "storage",
            AppError::InvalidSignature => "invalid_signature",
            AppError::Config(_) => "config",
            AppError::Encryption(_) => "encryption",
            AppError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Encryption(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status_code();
        let error_message = match &self {
            AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Storage(msg)
            | AppError::Config(msg)
            | AppError::Encryption(msg) => msg.clone(),
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                "Database error".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
