//! Cache Entry Module
//!
//! Defines a cached read response with its storage and expiration timestamps.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

// == Cache Entry ==
/// A stored read response keyed by normalized endpoint identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    /// Normalized endpoint key
    pub key: String,
    /// Opaque response body
    #[serde(skip)]
    pub payload: Vec<u8>,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
    /// When the entry stops being served as fresh; always after `stored_at`
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stored at `now` that expires after `ttl`.
    ///
    /// Callers must pass a strictly positive ttl.
    pub fn new(key: String, payload: Vec<u8>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            payload,
            stored_at: now,
            expires_at: now + ttl,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once `now >= expires_at`, so it stops being served
    /// the instant its horizon is reached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
