//! Error types for the offline engine
//!
//! Storage faults, transport faults and engine-level errors, all built on thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::queue::ItemStatus;

// == Store Error ==
/// Failure of the durable store (SQLite) or of a guarded status transition.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The storage medium failed
    #[error("storage failure: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Another thread panicked while holding the connection lock
    #[error("storage lock poisoned")]
    Poisoned,

    /// No queue item with this id
    #[error("queue item {0} not found")]
    ItemNotFound(i64),

    /// A status transition was requested from the wrong source state
    #[error("queue item {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: ItemStatus,
        to: ItemStatus,
    },

    /// A cache TTL must be strictly positive
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),

    /// A persisted row could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Convenience Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Transport Error ==
/// Failure reported by a Transport call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote service could not be reached at all
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The call did not finish within its deadline
    #[error("request timed out")]
    Timeout,

    /// The remote answered with a non-success status
    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The remote rejected the payload as malformed
    #[error("remote rejected payload: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether another attempt can possibly succeed.
    ///
    /// Rejections are validation faults: replaying the same payload cannot succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }

    /// Whether this failure means the network itself is gone.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Unreachable(_))
    }
}

/// Convenience Result type for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

// == Engine Error ==
/// Unified error type for engine operations and the local API.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Durable store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transport failure that could not be absorbed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No cached copy and no network
    #[error("no data available offline for {0}")]
    Unavailable(String),

    /// Invalid request data
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A warm-up manifest could not be read or parsed
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// A warm-up run is already in flight
    #[error("warm-up already running")]
    WarmupRunning,
}

// == IntoResponse Implementation ==
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Store(StoreError::ItemNotFound(_)) | EngineError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::Store(StoreError::InvalidTransition { .. })
            | EngineError::WarmupRunning => StatusCode::CONFLICT,
            EngineError::Store(StoreError::InvalidTtl(_))
            | EngineError::InvalidRequest(_)
            | EngineError::Manifest(_) => StatusCode::BAD_REQUEST,
            EngineError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Transport(_) => StatusCode::BAD_GATEWAY,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
