//! Connectivity probe task.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::connectivity::ConnectivityMonitor;
use crate::transport::{with_deadline, Transport};

/// Probes the remote every `interval` and feeds the result to `monitor`.
/// The first probe runs immediately.
pub fn spawn_probe_task(
    transport: Arc<dyn Transport>,
    monitor: ConnectivityMonitor,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let result = with_deadline(timeout, transport.probe()).await;
            if let Err(e) = &result {
                debug!(error = %e, "probe failed");
            }
            monitor.set_reachable(result.is_ok());
        }
    })
}
