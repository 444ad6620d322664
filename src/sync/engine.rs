//! Sync Engine
//!
//! Drains the write queue against the network. Items of one batch carry
//! distinct resource keys and are dispatched concurrently; each outcome is
//! recorded before the next batch is pulled, so per-key order holds.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::{normalize_path, split_query, CacheStore};
use crate::clock::SharedClock;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{EngineError, Result, TransportError, TransportResult};
use crate::queue::{Operation, QueueItem, SyncQueue, SyncStatus};
use crate::sync::{RetryDecision, RetryPolicy};
use crate::transport::{with_deadline, Ack, Transport};

/// Default number of items pulled per batch.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Shortest pause between ticks, so an item that is due but cannot be
/// drained yet does not spin the ticker.
pub const MIN_TICK_DELAY: Duration = Duration::from_millis(100);

/// Tunables for the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub batch_size: usize,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

// == Sync Engine ==
pub struct SyncEngine {
    queue: SyncQueue,
    cache: CacheStore,
    transport: Arc<dyn Transport>,
    monitor: ConnectivityMonitor,
    clock: SharedClock,
    settings: EngineSettings,
    /// Held for the whole of a drain
    drain_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        queue: SyncQueue,
        cache: CacheStore,
        transport: Arc<dyn Transport>,
        monitor: ConnectivityMonitor,
        clock: SharedClock,
        settings: EngineSettings,
    ) -> Self {
        Self {
            queue,
            cache,
            transport,
            monitor,
            clock,
            settings,
            drain_lock: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Whether a drain currently holds the engine.
    pub fn is_draining(&self) -> bool {
        self.drain_lock.try_lock().is_err()
    }

    // == Submit ==
    /// Queues a write. When the remote is reachable a background drain is
    /// started; the caller never waits on the network.
    pub fn submit(
        self: &Arc<Self>,
        resource_key: &str,
        operation: Operation,
        endpoint: &str,
        payload: Vec<u8>,
    ) -> Result<i64> {
        let id = self.queue.enqueue(resource_key, operation, endpoint, payload)?;
        self.schedule_drain();
        Ok(id)
    }

    /// Starts a background drain when the remote is reachable.
    pub fn schedule_drain(self: &Arc<Self>) {
        if !self.monitor.is_reachable() {
            return;
        }
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.drain().await {
                warn!(error = %e, "background drain failed");
            }
        });
    }

    // == Drain ==
    /// Dispatches eligible items until none remain or the remote is lost.
    /// Waits for a drain already in flight to finish first.
    pub async fn drain(&self) -> Result<SyncStatus> {
        let _guard = self.drain_lock.lock().await;
        self.drain_locked().await
    }

    /// Periodic safety net. Returns `None` when a drain is already running.
    pub async fn tick(&self) -> Result<Option<SyncStatus>> {
        match self.drain_lock.try_lock() {
            Ok(_guard) => self.drain_locked().await.map(Some),
            Err(_) => {
                debug!("tick skipped, drain in flight");
                Ok(None)
            }
        }
    }

    /// How long the ticker may sleep before calling `tick` again: until the
    /// earliest backoff gate, capped at `max` and floored at
    /// `MIN_TICK_DELAY`. While unreachable the full `max` is used.
    pub fn next_tick_delay(&self, max: Duration) -> Result<Duration> {
        if !self.monitor.is_reachable() {
            return Ok(max);
        }
        let delay = match self.queue.next_due_at()? {
            Some(at) => (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO),
            None => max,
        };
        Ok(delay.clamp(MIN_TICK_DELAY.min(max), max))
    }

    /// Entry point for the "became reachable" edge.
    pub async fn on_connectivity_restored(&self) -> Result<SyncStatus> {
        info!("connectivity restored, draining queue");
        self.drain().await
    }

    async fn drain_locked(&self) -> Result<SyncStatus> {
        let mut dispatched = 0usize;

        while self.monitor.is_reachable() {
            let batch = self.queue.next_batch(self.settings.batch_size)?;
            if batch.is_empty() {
                break;
            }

            for item in &batch {
                self.queue.mark_syncing(item.id)?;
            }

            let outcomes = join_all(batch.iter().map(|item| self.dispatch(item))).await;
            dispatched += batch.len();

            // Every dispatched item is settled before an error is returned
            let mut lost_connectivity = false;
            let mut first_error: Option<EngineError> = None;
            for (item, outcome) in batch.iter().zip(outcomes) {
                let recorded = match outcome {
                    Ok(ack) => self.complete(item, &ack),
                    Err(e) if e.is_unreachable() => {
                        lost_connectivity = true;
                        self.queue.release(item.id, &e.to_string()).map_err(EngineError::from)
                    }
                    Err(e) => self.fail(item, &e),
                };
                if let Err(e) = recorded {
                    error!(item_id = item.id, error = %e, "recording dispatch outcome failed");
                    first_error.get_or_insert(e);
                }
            }

            if lost_connectivity {
                self.monitor.set_reachable(false);
            }
            if let Some(e) = first_error {
                return Err(e);
            }
            if lost_connectivity {
                break;
            }
        }

        let status = self.queue.status()?;
        if dispatched > 0 {
            info!(
                dispatched,
                pending = status.pending_count,
                failed = status.failed_count,
                "drain finished"
            );
        }
        Ok(status)
    }

    async fn dispatch(&self, item: &QueueItem) -> TransportResult<Ack> {
        debug!(
            item_id = item.id,
            resource_key = %item.resource_key,
            operation = %item.operation,
            "dispatching"
        );
        with_deadline(
            self.settings.request_timeout,
            self.transport.dispatch(item.operation, &item.endpoint, &item.payload),
        )
        .await
    }

    /// Records the acknowledgement, then drops cached reads of the resource.
    /// An invalidation fault is reported after the item is already completed.
    fn complete(&self, item: &QueueItem, ack: &Ack) -> Result<()> {
        self.queue.mark_completed(item.id)?;
        debug!(item_id = item.id, status = ack.status, "write acknowledged");

        let invalidated = invalidate_resource(&self.cache, &item.endpoint)?;
        if invalidated > 0 {
            debug!(item_id = item.id, invalidated, "cached reads invalidated");
        }
        Ok(())
    }

    fn fail(&self, item: &QueueItem, error: &TransportError) -> Result<()> {
        let failed = self.queue.mark_failed(item.id, &error.to_string())?;

        match self.settings.retry.decide(failed.attempts, error) {
            RetryDecision::RetryAfter(delay) => {
                let delay = chrono::Duration::milliseconds(delay.as_millis() as i64);
                self.queue.requeue(item.id, self.clock.now() + delay)?;
                debug!(
                    item_id = item.id,
                    attempts = failed.attempts,
                    retry_in_ms = delay.num_milliseconds(),
                    error = %error,
                    "dispatch failed, will retry"
                );
            }
            RetryDecision::GiveUp => {
                warn!(
                    item_id = item.id,
                    resource_key = %item.resource_key,
                    attempts = failed.attempts,
                    error = %error,
                    "write failed terminally"
                );
            }
        }
        Ok(())
    }
}

/// Drops cached reads of the resource a write touched: the endpoint itself,
/// anything below it, and the listing of its parent collection.
pub(crate) fn invalidate_resource(cache: &CacheStore, endpoint: &str) -> Result<usize> {
    let (path, _) = split_query(endpoint.trim());
    let path = normalize_path(path);

    let mut removed = usize::from(cache.invalidate(&path)?);
    removed += cache.invalidate_by_prefix(&format!("{}?", path))?;
    // Everything lives below the root
    if path != "/" {
        removed += cache.invalidate_by_prefix(&format!("{}/", path))?;
    }

    if let Some((parent, _)) = path.rsplit_once('/') {
        if !parent.is_empty() {
            removed += usize::from(cache.invalidate(parent)?);
            removed += cache.invalidate_by_prefix(&format!("{}?", parent))?;
        }
    }
    Ok(removed)
}
