//! Sync Queue Module
//!
//! Durable, ordered table of pending writes. Ordering is guaranteed per
//! resource key: `next_batch` only ever hands out the oldest unsettled item of
//! each key.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::clock::{from_millis, to_millis, SharedClock};
use crate::error::{StoreError, StoreResult};
use crate::queue::{ItemStatus, Operation, QueueItem, SyncStatus};
use crate::storage::Database;

const ITEM_COLUMNS: &str = "id, resource_key, operation, endpoint, payload, status, attempts, \
     last_error, next_attempt_at, created_at, completed_at, last_attempt_at";

// == Duplicate Policy ==
/// What `enqueue` does with a write identical to the one already waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Always append; callers dedupe their own retries
    #[default]
    Allow,
    /// Reuse the newest unsettled item of the key when it is still pending
    /// with the same operation, endpoint and payload
    #[serde(rename = "coalesce")]
    CoalescePending,
}

// == Sync Queue ==
/// Durable write queue. Clones share the connection and change feed.
#[derive(Clone, Debug)]
pub struct SyncQueue {
    db: Database,
    clock: SharedClock,
    duplicate_policy: DuplicatePolicy,
    changes: Arc<watch::Sender<u64>>,
}

impl SyncQueue {
    // == Constructor ==
    pub fn new(db: Database, clock: SharedClock) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            db,
            clock,
            duplicate_policy: DuplicatePolicy::default(),
            changes: Arc::new(changes),
        }
    }

    /// Sets how identical consecutive writes are handled.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    // == Enqueue ==
    /// Appends a pending write and returns its id. Never touches the network.
    pub fn enqueue(
        &self,
        resource_key: &str,
        operation: Operation,
        endpoint: &str,
        payload: Vec<u8>,
    ) -> StoreResult<i64> {
        let now = to_millis(self.clock.now());
        let id = {
            let conn = self.db.lock()?;

            if self.duplicate_policy == DuplicatePolicy::CoalescePending {
                let newest = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM sync_queue
                             WHERE resource_key = ?1 AND status != 'completed'
                             ORDER BY id DESC LIMIT 1",
                            ITEM_COLUMNS
                        ),
                        params![resource_key],
                        item_from_row,
                    )
                    .optional()?;

                if let Some(item) = newest {
                    if item.status == ItemStatus::Pending
                        && item.operation == operation
                        && item.endpoint == endpoint
                        && item.payload == payload
                    {
                        debug!(item_id = item.id, resource_key, "coalesced duplicate write");
                        return Ok(item.id);
                    }
                }
            }

            conn.execute(
                "INSERT INTO sync_queue
                    (resource_key, operation, endpoint, payload, status, attempts, next_attempt_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)",
                params![resource_key, operation, endpoint, payload, now],
            )?;
            conn.last_insert_rowid()
        };

        debug!(item_id = id, resource_key, %operation, "enqueued write");
        self.notify();
        Ok(id)
    }

    // == Next Batch ==
    /// Returns up to `limit` dispatchable items, oldest first.
    ///
    /// An item is dispatchable when it is pending, its backoff gate is due and
    /// no earlier item of the same resource key is still unsettled. One batch
    /// therefore never holds two items of the same key, while unrelated keys
    /// are returned together.
    pub fn next_batch(&self, limit: usize) -> StoreResult<Vec<QueueItem>> {
        let now = to_millis(self.clock.now());
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_queue q
             WHERE q.status = 'pending'
               AND q.next_attempt_at <= ?1
               AND NOT EXISTS (
                   SELECT 1 FROM sync_queue e
                   WHERE e.resource_key = q.resource_key
                     AND e.id < q.id
                     AND e.status != 'completed')
             ORDER BY q.id
             LIMIT ?2",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![now, limit as i64], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Earliest `next_attempt_at` among pending items at the head of their
    /// resource key. Items held back by an earlier unsettled item are ignored.
    pub fn next_due_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let conn = self.db.lock()?;
        let due: Option<i64> = conn.query_row(
            "SELECT MIN(q.next_attempt_at) FROM sync_queue q
             WHERE q.status = 'pending'
               AND NOT EXISTS (
                   SELECT 1 FROM sync_queue e
                   WHERE e.resource_key = q.resource_key
                     AND e.id < q.id
                     AND e.status != 'completed')",
            [],
            |row| row.get(0),
        )?;
        Ok(due.map(from_millis))
    }

    // == Status Transitions ==
    /// `pending → syncing`.
    pub fn mark_syncing(&self, id: i64) -> StoreResult<()> {
        let now = to_millis(self.clock.now());
        self.transition(
            id,
            ItemStatus::Syncing,
            "UPDATE sync_queue SET status = 'syncing', last_attempt_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, now],
        )
    }

    /// `syncing → completed`.
    pub fn mark_completed(&self, id: i64) -> StoreResult<()> {
        let now = to_millis(self.clock.now());
        self.transition(
            id,
            ItemStatus::Completed,
            "UPDATE sync_queue SET status = 'completed', completed_at = ?2
             WHERE id = ?1 AND status = 'syncing'",
            params![id, now],
        )
    }

    /// `syncing → failed`, counting the attempt. Returns the updated item.
    pub fn mark_failed(&self, id: i64, error: &str) -> StoreResult<QueueItem> {
        self.transition(
            id,
            ItemStatus::Failed,
            "UPDATE sync_queue SET status = 'failed', attempts = attempts + 1, last_error = ?2
             WHERE id = ?1 AND status = 'syncing'",
            params![id, error],
        )?;
        self.get(id)?.ok_or(StoreError::ItemNotFound(id))
    }

    /// `failed → pending`, not dispatchable before `not_before`.
    pub fn requeue(&self, id: i64, not_before: DateTime<Utc>) -> StoreResult<()> {
        self.transition(
            id,
            ItemStatus::Pending,
            "UPDATE sync_queue SET status = 'pending', next_attempt_at = ?2
             WHERE id = ?1 AND status = 'failed'",
            params![id, to_millis(not_before)],
        )
    }

    /// `syncing → pending` without counting an attempt. Used when the network
    /// vanished mid-dispatch, which says nothing about the item itself.
    pub fn release(&self, id: i64, error: &str) -> StoreResult<()> {
        self.transition(
            id,
            ItemStatus::Pending,
            "UPDATE sync_queue SET status = 'pending', last_error = ?2
             WHERE id = ?1 AND status = 'syncing'",
            params![id, error],
        )
    }

    // == Operator Actions ==
    /// Re-admits a failed item with a fresh attempt budget.
    pub fn retry(&self, id: i64) -> StoreResult<()> {
        let now = to_millis(self.clock.now());
        self.transition(
            id,
            ItemStatus::Pending,
            "UPDATE sync_queue
             SET status = 'pending', attempts = 0, last_error = NULL, next_attempt_at = ?2
             WHERE id = ?1 AND status = 'failed'",
            params![id, now],
        )?;
        info!(item_id = id, "failed item re-admitted for retry");
        Ok(())
    }

    /// Drops a failed item, releasing the later items of its key.
    pub fn discard(&self, id: i64) -> StoreResult<()> {
        self.transition(
            id,
            ItemStatus::Failed,
            "DELETE FROM sync_queue WHERE id = ?1 AND status = 'failed'",
            params![id],
        )?;
        info!(item_id = id, "failed item discarded");
        Ok(())
    }

    /// Returns items left in `syncing` by an interrupted process to `pending`.
    pub fn recover_orphaned(&self) -> StoreResult<usize> {
        let recovered = {
            let conn = self.db.lock()?;
            conn.execute(
                "UPDATE sync_queue SET status = 'pending' WHERE status = 'syncing'",
                [],
            )?
        };
        if recovered > 0 {
            info!(recovered, "recovered orphaned syncing items");
            self.notify();
        }
        Ok(recovered)
    }

    // == Purge Completed ==
    /// Deletes completed items settled at least `older_than` ago.
    pub fn purge_completed(&self, older_than: Duration) -> StoreResult<usize> {
        let cutoff = to_millis(self.clock.now() - older_than);
        let removed = {
            let conn = self.db.lock()?;
            conn.execute(
                "DELETE FROM sync_queue WHERE status = 'completed' AND completed_at <= ?1",
                params![cutoff],
            )?
        };
        if removed > 0 {
            self.notify();
        }
        Ok(removed)
    }

    // == Queries ==
    pub fn get(&self, id: i64) -> StoreResult<Option<QueueItem>> {
        let conn = self.db.lock()?;
        let item = conn
            .query_row(
                &format!("SELECT {} FROM sync_queue WHERE id = ?1", ITEM_COLUMNS),
                params![id],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    /// Lists items in submission order, optionally filtered by status.
    pub fn list(&self, status: Option<ItemStatus>, limit: usize) -> StoreResult<Vec<QueueItem>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_queue
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY id
             LIMIT ?2",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![status, limit as i64], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Counts items per state.
    pub fn status(&self) -> StoreResult<SyncStatus> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, ItemStatus>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut status = SyncStatus::default();
        for row in rows {
            let (state, count) = row?;
            match state {
                ItemStatus::Pending => status.pending_count = count as u64,
                ItemStatus::Syncing => status.syncing_count = count as u64,
                ItemStatus::Failed => status.failed_count = count as u64,
                ItemStatus::Completed => {}
            }
        }
        Ok(status)
    }

    /// Items not yet acknowledged by the remote.
    pub fn len_unsettled(&self) -> StoreResult<u64> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status != 'completed'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Error of the most recently attempted item that has not yet succeeded.
    pub fn last_error(&self) -> StoreResult<Option<String>> {
        let conn = self.db.lock()?;
        let error = conn
            .query_row(
                "SELECT last_error FROM sync_queue
                 WHERE status != 'completed' AND last_error IS NOT NULL
                 ORDER BY last_attempt_at DESC, id DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(error)
    }

    // == Change Feed ==
    /// Receiver that observes a new revision after every mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    /// Runs a status-guarded statement; zero affected rows becomes a
    /// not-found or invalid-transition error.
    fn transition<P: Params>(&self, id: i64, to: ItemStatus, sql: &str, params: P) -> StoreResult<()> {
        {
            let conn = self.db.lock()?;
            if conn.execute(sql, params)? == 0 {
                let current: Option<ItemStatus> = conn
                    .query_row(
                        "SELECT status FROM sync_queue WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Err(match current {
                    Some(from) => StoreError::InvalidTransition { id, from, to },
                    None => StoreError::ItemNotFound(id),
                });
            }
        }
        self.notify();
        Ok(())
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        id: row.get(0)?,
        resource_key: row.get(1)?,
        operation: row.get(2)?,
        endpoint: row.get(3)?,
        payload: row.get(4)?,
        status: row.get(5)?,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        next_attempt_at: from_millis(row.get(8)?),
        created_at: from_millis(row.get(9)?),
        completed_at: row.get::<_, Option<i64>>(10)?.map(from_millis),
        last_attempt_at: row.get::<_, Option<i64>>(11)?.map(from_millis),
    })
}
