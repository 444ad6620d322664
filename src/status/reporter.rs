//! Status Reporter
//!
//! Single place where engine status is derived. A snapshot is recomputed from
//! the two stores and the connectivity signal; the publisher task pushes it
//! to subscribers whenever one of them changes.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::error;

use crate::cache::CacheStore;
use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::queue::SyncQueue;

/// What the presentation layer shows about offline state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Live cache entries
    pub cached: u64,
    /// Writes not yet acknowledged (pending + syncing + failed)
    pub queued: u64,
    pub pending: u64,
    pub syncing: u64,
    pub failed: u64,
    pub last_error: Option<String>,
    pub reachable: bool,
}

#[derive(Debug, Clone)]
pub struct StatusReporter {
    cache: CacheStore,
    queue: SyncQueue,
    monitor: ConnectivityMonitor,
    published: std::sync::Arc<watch::Sender<StatusSnapshot>>,
}

impl StatusReporter {
    pub fn new(cache: CacheStore, queue: SyncQueue, monitor: ConnectivityMonitor) -> Self {
        let (published, _) = watch::channel(StatusSnapshot::default());
        Self {
            cache,
            queue,
            monitor,
            published: std::sync::Arc::new(published),
        }
    }

    /// Computes the current status from the stores.
    pub fn snapshot(&self) -> Result<StatusSnapshot> {
        let cache = self.cache.stats()?;
        let queue = self.queue.status()?;

        Ok(StatusSnapshot {
            cached: cache.live,
            queued: queue.queued(),
            pending: queue.pending_count,
            syncing: queue.syncing_count,
            failed: queue.failed_count,
            last_error: self.queue.last_error()?,
            reachable: self.monitor.is_reachable(),
        })
    }

    /// Recomputes and publishes the snapshot if it differs from the last one.
    pub fn refresh(&self) -> Result<StatusSnapshot> {
        let snapshot = self.snapshot()?;
        self.published.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });
        Ok(snapshot)
    }

    /// Receiver of published snapshots.
    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.published.subscribe()
    }

    /// Calls `callback` with the last published snapshot and then on every
    /// change. Abort the returned handle to unsubscribe.
    pub fn subscribe<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(&StatusSnapshot) + Send + 'static,
    {
        let mut rx = self.watch();
        tokio::spawn(async move {
            let initial = rx.borrow_and_update().clone();
            callback(&initial);
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                callback(&snapshot);
            }
        })
    }

    /// Republishes on every store or connectivity change, and at least once
    /// per `interval`.
    pub fn spawn_publisher(&self, interval: Duration) -> JoinHandle<()> {
        let reporter = self.clone();
        let mut cache_changes = self.cache.subscribe_changes();
        let mut queue_changes = self.queue.subscribe_changes();
        let mut reachability = self.monitor.watch();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let open = tokio::select! {
                    changed = cache_changes.changed() => changed.is_ok(),
                    changed = queue_changes.changed() => changed.is_ok(),
                    changed = reachability.changed() => changed.is_ok(),
                    _ = ticker.tick() => true,
                };
                if !open {
                    break;
                }

                if let Err(e) = reporter.refresh() {
                    error!(error = %e, "status refresh failed");
                }
            }
        })
    }
}
