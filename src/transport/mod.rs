//! Transport Module
//!
//! The network capability the engine is handed. Implementations turn reads
//! and queued writes into calls against the remote service, and classify
//! failures so the engine can decide between retrying and giving up.

mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::cache::QueryParams;
use crate::error::{TransportError, TransportResult};
use crate::queue::Operation;

pub use http::HttpTransport;

/// Remote acknowledgement of a dispatched write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub status: u16,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl Ack {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// Network access used by the sync engine, the warmer and the reader.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Reads `endpoint` with `params` and returns the raw response body.
    async fn fetch(&self, endpoint: &str, params: &QueryParams) -> TransportResult<Vec<u8>>;

    /// Replays one queued write.
    async fn dispatch(&self, operation: Operation, endpoint: &str, payload: &[u8]) -> TransportResult<Ack>;

    /// Cheap reachability check.
    async fn probe(&self) -> TransportResult<()>;
}

/// Bounds a transport call by `limit`, turning an elapsed deadline into
/// `TransportError::Timeout`.
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> TransportResult<T>
where
    F: std::future::Future<Output = TransportResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}
