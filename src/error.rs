//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its HTTP front-end.
///
/// Absence of a key is never an error inside the engine: `get` yields `None`
/// and `delete` yields `false`. `NotFound` only exists so the HTTP layer can
/// turn a miss into a 404.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Durable log open, append, sync or read failure
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A log line that cannot be decoded during replay
    #[error("Corrupt record at line {line}: {reason}")]
    CorruptRecord { line: u64, reason: String },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Mutation attempted after the engine was closed
    #[error("Cache engine is closed")]
    Closed,

    /// Key not found (HTTP layer only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Io(_) | CacheError::CorruptRecord { .. } | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
