//! HTTP error type
//!
//! Every failure a handler can produce maps to one [`ApiError`] variant, which
//! renders as `{"error":{"code":..,"message":..}}` with the matching status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use turbocache_storage::StorageError;

/// Result type for request handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned to cache clients
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request (missing header, bad hash or team)
    #[error("{0}")]
    BadRequest(String),

    /// Bearer token missing from the allow-set
    #[error("{0}")]
    Unauthorized(String),

    /// Artifact not stored
    #[error("{0}")]
    NotFound(String),

    /// Upload body is not `application/octet-stream`
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Upload body exceeds the configured limit
    #[error("payload exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Limit in bytes
        limit: u64,
    },

    /// Storage call exceeded its deadline
    #[error("{0}")]
    Timeout(String),

    /// Storage backend failure; the detail is logged, never returned
    #[error("{0}")]
    Backend(String),
}

impl ApiError {
    /// Create a BadRequest error
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        ApiError::BadRequest(msg.into())
    }

    /// Create an Unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::UnsupportedMediaType(_) => "unsupported_media_type",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::Timeout(_) => "backend_timeout",
            ApiError::Backend(_) => "backend_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Backend(_) => "storage backend failure".to_string(),
            ApiError::Timeout(_) => "storage backend timed out".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ApiError::NotFound("Artifact not found".to_string()),
            StorageError::TooLarge { limit } => ApiError::PayloadTooLarge { limit },
            StorageError::InvalidKey(msg) => ApiError::BadRequest(msg),
            StorageError::Timeout(msg) => ApiError::Timeout(msg),
            other => ApiError::Backend(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::Backend(detail) | ApiError::Timeout(detail) => {
                tracing::error!(status = status.as_u16(), "storage failure: {}", detail);
            }
            other => {
                tracing::debug!(status = status.as_u16(), "request rejected: {}", other);
            }
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        });
        (status, Json(body)).into_response()
    }
}
