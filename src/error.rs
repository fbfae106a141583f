//! Error types for the realtime cache layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and the realtime subscription layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is empty or too deep
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Fetcher failed after all retry attempts
    #[error("Fetch failed for {key} after {attempts} attempt(s): {message}")]
    FetchFailed {
        key: String,
        attempts: u32,
        message: String,
    },

    /// Identity cannot be turned into a server-side scoping filter
    #[error("Invalid subscription scope: {0}")]
    InvalidScope(String),

    /// Change channel refused or failed to open a subscription
    #[error("Subscription failed: {0}")]
    Subscribe(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            CacheError::InvalidScope(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
            CacheError::Subscribe(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
