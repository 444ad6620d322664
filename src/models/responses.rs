//! Response DTOs for the local API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::queue::{ItemStatus, QueueItem, SyncStatus};

/// Response body for POST /queue
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub id: i64,
    pub status: ItemStatus,
}

/// A queue item as shown by the API, with its payload decoded when it is JSON.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItemResponse {
    #[serde(flatten)]
    pub item: QueueItem,
    pub payload: Option<Value>,
}

impl From<QueueItem> for QueueItemResponse {
    fn from(item: QueueItem) -> Self {
        let payload = if item.payload.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&item.payload)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&item.payload).into_owned())),
            )
        };
        Self { item, payload }
    }
}

/// Response body for POST /sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    #[serde(flatten)]
    pub status: SyncStatus,
    pub reachable: bool,
}

/// Acknowledgement of an operator action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
