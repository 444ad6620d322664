//! Cache Store Module
//!
//! Durable response cache with time-based expiration, backed by SQLite.

use std::sync::Arc;

use chrono::Duration;
use rusqlite::{params, OptionalExtension, Row};
use tokio::sync::watch;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats};
use crate::clock::{from_millis, to_millis, SharedClock};
use crate::error::{StoreError, StoreResult};
use crate::storage::Database;

/// Default freshness horizon for cached responses.
pub const DEFAULT_TTL_DAYS: i64 = 30;

// == Cache Store ==
/// Durable key → response table with expiration.
///
/// Clones share the same connection and change feed.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: Database,
    clock: SharedClock,
    /// Horizon applied when `put` is called without a ttl
    default_ttl: Duration,
    changes: Arc<watch::Sender<u64>>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store over `db` whose entries default to `default_ttl`.
    pub fn new(db: Database, clock: SharedClock, default_ttl: Duration) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            db,
            clock,
            default_ttl,
            changes: Arc::new(changes),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == Put ==
    /// Stores `payload` under `key`, overwriting any previous entry.
    ///
    /// The entry expires `ttl` after now (default horizon when `None`).
    pub fn put(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> StoreResult<CacheEntry> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl <= Duration::zero() {
            return Err(StoreError::InvalidTtl(format!(
                "ttl for '{}' must be positive, got {}s",
                key,
                ttl.num_seconds()
            )));
        }

        let entry = CacheEntry::new(key.to_string(), payload, self.clock.now(), ttl);
        {
            let conn = self.db.lock()?;
            conn.execute(
                "INSERT INTO cache_entries (key, payload, stored_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    payload = excluded.payload,
                    stored_at = excluded.stored_at,
                    expires_at = excluded.expires_at",
                params![
                    entry.key,
                    entry.payload,
                    to_millis(entry.stored_at),
                    to_millis(entry.expires_at)
                ],
            )?;
        }

        debug!(key, expires_at = %entry.expires_at, "cached response");
        self.notify();
        Ok(entry)
    }

    // == Get ==
    /// Returns the live entry for `key`.
    ///
    /// Absent and expired entries are both misses; expired rows are left
    /// for `sweep_expired`.
    pub fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        let now = self.clock.now();
        Ok(self.peek(key)?.filter(|entry| !entry.is_expired(now)))
    }

    // == Peek ==
    /// Returns the entry for `key` even when it has expired.
    pub fn peek(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        let conn = self.db.lock()?;
        let entry = conn
            .query_row(
                "SELECT key, payload, stored_at, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    // == Invalidate ==
    /// Removes the entry for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> StoreResult<bool> {
        let removed = {
            let conn = self.db.lock()?;
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?
        };
        if removed > 0 {
            debug!(key, "invalidated cache entry");
            self.notify();
        }
        Ok(removed > 0)
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn invalidate_by_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let removed = {
            let conn = self.db.lock()?;
            conn.execute(
                "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )?
        };
        if removed > 0 {
            debug!(prefix, removed, "invalidated cache entries by prefix");
            self.notify();
        }
        Ok(removed)
    }

    // == Sweep Expired ==
    /// Deletes every entry with `expires_at <= now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> StoreResult<usize> {
        let now = to_millis(self.clock.now());
        let removed = {
            let conn = self.db.lock()?;
            conn.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![now],
            )?
        };
        if removed > 0 {
            self.notify();
        }
        Ok(removed)
    }

    // == Stats ==
    /// Returns live and expired entry counts.
    pub fn stats(&self) -> StoreResult<CacheStats> {
        let now = to_millis(self.clock.now());
        let (entries, live): (i64, i64) = {
            let conn = self.db.lock()?;
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0)
                 FROM cache_entries",
                params![now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
        };

        Ok(CacheStats {
            entries: entries as u64,
            live: live as u64,
            expired: (entries - live) as u64,
        })
    }

    // == Length ==
    /// Returns the number of stored rows, expired ones included.
    pub fn len(&self) -> StoreResult<u64> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    // == Change Feed ==
    /// Receiver that observes a new revision after every mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        key: row.get(0)?,
        payload: row.get(1)?,
        stored_at: from_millis(row.get(2)?),
        expires_at: from_millis(row.get(3)?),
    })
}
