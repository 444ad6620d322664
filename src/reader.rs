//! Offline Reader
//!
//! Read-through front for the cache:
//!
//! 1. Live cache entry: served without touching the network
//! 2. Miss while reachable: fetched, stored, served
//! 3. Fetch failure or offline: the newest stored copy, even expired
//! 4. Nothing stored and no network: `EngineError::Unavailable`

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::cache::{CacheEntry, CacheKey, CacheStore, QueryParams};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{EngineError, Result, TransportError};
use crate::transport::{with_deadline, Transport};

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadSource {
    Network,
    Cache,
    /// Expired or unconfirmed copy served because the network failed
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub key: CacheKey,
    pub payload: Vec<u8>,
    pub source: ReadSource,
    /// When the served copy was stored; `None` for network reads
    pub stored_at: Option<DateTime<Utc>>,
}

impl ReadResult {
    fn from_entry(key: CacheKey, entry: CacheEntry, source: ReadSource) -> Self {
        Self {
            key,
            stored_at: Some(entry.stored_at),
            payload: entry.payload,
            source,
        }
    }
}

#[derive(Clone)]
pub struct OfflineReader {
    cache: CacheStore,
    transport: Arc<dyn Transport>,
    monitor: ConnectivityMonitor,
    request_timeout: Duration,
}

impl OfflineReader {
    pub fn new(
        cache: CacheStore,
        transport: Arc<dyn Transport>,
        monitor: ConnectivityMonitor,
        request_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            transport,
            monitor,
            request_timeout,
        }
    }

    pub async fn read(&self, endpoint: &str, params: &QueryParams) -> Result<ReadResult> {
        let key = CacheKey::normalize(endpoint, params);

        if let Some(entry) = self.cache.get(key.as_str())? {
            return Ok(ReadResult::from_entry(key, entry, ReadSource::Cache));
        }

        let fetch_error = if self.monitor.is_reachable() {
            match with_deadline(self.request_timeout, self.transport.fetch(endpoint, params)).await {
                Ok(payload) => {
                    self.cache.put(key.as_str(), payload.clone(), None)?;
                    return Ok(ReadResult {
                        key,
                        payload,
                        source: ReadSource::Network,
                        stored_at: None,
                    });
                }
                Err(e) => {
                    if e.is_unreachable() {
                        self.monitor.set_reachable(false);
                    }
                    debug!(key = %key, error = %e, "read-through fetch failed");
                    Some(e)
                }
            }
        } else {
            None
        };

        if let Some(entry) = self.cache.peek(key.as_str())? {
            return Ok(ReadResult::from_entry(key, entry, ReadSource::Stale));
        }

        Err(match fetch_error {
            Some(e @ (TransportError::Status { .. } | TransportError::Rejected(_))) => EngineError::Transport(e),
            _ => EngineError::Unavailable(key.into_string()),
        })
    }
}
