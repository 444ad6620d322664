//! Maintenance Task
//!
//! Background task that periodically sweeps expired cache entries and purges
//! completed queue items past their retention window.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::CacheStore;
use crate::error::StoreResult;
use crate::queue::SyncQueue;

/// Rows removed by one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub swept: usize,
    pub purged: usize,
}

/// Runs one sweep-and-purge pass.
pub fn run_maintenance(
    cache: &CacheStore,
    queue: &SyncQueue,
    retention: chrono::Duration,
) -> StoreResult<MaintenanceReport> {
    Ok(MaintenanceReport {
        swept: cache.sweep_expired()?,
        purged: queue.purge_completed(retention)?,
    })
}

/// Spawns the periodic maintenance loop.
///
/// The first pass runs after one full `interval`. Abort the handle on
/// shutdown.
pub fn spawn_maintenance_task(
    cache: CacheStore,
    queue: SyncQueue,
    interval: Duration,
    retention: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            retention_days = retention.num_days(),
            "starting maintenance task"
        );

        loop {
            tokio::time::sleep(interval).await;

            match run_maintenance(&cache, &queue, retention) {
                Ok(report) if report.swept > 0 || report.purged > 0 => {
                    info!(swept = report.swept, purged = report.purged, "maintenance pass");
                }
                Ok(_) => debug!("maintenance: nothing to remove"),
                Err(e) => error!(error = %e, "maintenance pass failed"),
            }
        }
    })
}
