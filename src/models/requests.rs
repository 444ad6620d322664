//! Request DTOs for the local API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::Value;

use crate::queue::{ItemStatus, Operation};
use crate::warmup::Manifest;

/// Longest accepted resource key or endpoint.
const MAX_FIELD_LEN: usize = 1024;

/// Request body for submitting a write (POST /queue)
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    /// Logical target the write is ordered by
    pub resource_key: String,
    pub operation: Operation,
    /// Remote endpoint the write is replayed against
    pub endpoint: String,
    /// JSON body sent on replay; omitted or null sends no body
    #[serde(default)]
    pub payload: Value,
}

impl SubmitRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.resource_key.trim().is_empty() {
            return Some("resource_key cannot be empty".to_string());
        }
        if self.endpoint.trim().is_empty() {
            return Some("endpoint cannot be empty".to_string());
        }
        if self.resource_key.len() > MAX_FIELD_LEN || self.endpoint.len() > MAX_FIELD_LEN {
            return Some(format!("fields are limited to {} characters", MAX_FIELD_LEN));
        }
        None
    }

    /// Bytes stored in the queue.
    pub fn payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        }
    }
}

/// Query string for GET /queue
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueListQuery {
    pub status: Option<ItemStatus>,
    pub limit: Option<usize>,
}

impl QueueListQuery {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1000;

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }
}

/// Optional body for POST /warmup; the configured manifest is used when absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarmupRequest {
    #[serde(default)]
    pub manifest: Option<Manifest>,
}
