//! Error types for the scan service
//!
//! `ApiError` is what handlers return; component errors that end a job
//! (acquisition, recognition) never reach HTTP, they become `state: "error"`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Rejected submission input
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Neither a file nor a url was supplied
    #[error("Provide a file or a url.")]
    MissingSource,

    /// A scan parameter failed to parse or is out of range
    #[error("Invalid value for {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    /// Client-side: no usable API base URL
    #[error("API base URL is not configured: {0}")]
    ApiBase(String),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload exceeded the configured limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
