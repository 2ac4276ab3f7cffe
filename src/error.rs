//! Error types for the Biblio server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
///
/// Each variant is one caller-visible failure kind; the HTTP mapping lives in
/// `IntoResponse` below and nowhere else.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large: more than {max} bytes")]
    PayloadTooLarge { max: u64 },

    #[error("Invalid token: {0}")]
    TokenInvalid(#[from] TokenRejection),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a stream token was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("malformed")]
    Malformed,

    #[error("bad signature")]
    BadSignature,

    #[error("expired")]
    Expired,

    #[error("scope mismatch")]
    ScopeMismatch,

    #[error("subject mismatch")]
    SubjectMismatch,
}

/// Blob store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Upload failed for {key}: {message}")]
    UploadFailed { key: String, message: String },

    #[error("Remote responded with status {status} for {key}")]
    RemoteStatus { key: String, status: u16 },

    #[error("Storage operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("S3 SDK error: {0}")]
    SdkError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            AppError::PayloadTooLarge { max } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                format!("Uploaded file exceeds size limit of {} bytes", max),
            ),
            AppError::TokenInvalid(reason) => {
                tracing::debug!(reason = %reason, "Rejected stream token");
                (
                    StatusCode::UNAUTHORIZED,
                    "invalid_token",
                    "Invalid or expired token".to_string(),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Storage error".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "io_error",
                    "IO error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::NotFound("book".into()), StatusCode::NOT_FOUND),
            (AppError::InvalidInput("mime".into()), StatusCode::BAD_REQUEST),
            (AppError::PayloadTooLarge { max: 10 }, StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::TokenInvalid(TokenRejection::Expired), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("admin".into()), StatusCode::FORBIDDEN),
            (
                AppError::Storage(StorageError::RemoteStatus { key: "k".into(), status: 503 }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_token_rejection_display() {
        assert_eq!(TokenRejection::Expired.to_string(), "expired");
        assert_eq!(
            AppError::from(TokenRejection::SubjectMismatch).to_string(),
            "Invalid token: subject mismatch"
        );
    }
}
