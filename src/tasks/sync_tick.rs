//! Sync triggers: the periodic tick and the reconnect listener.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityEvent;
use crate::sync::SyncEngine;

/// Calls `SyncEngine::tick` at least every `interval`, and sooner when a
/// backed-off item becomes due.
pub fn spawn_sync_ticker(engine: Arc<SyncEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "starting sync ticker");

        loop {
            let delay = engine.next_tick_delay(interval).unwrap_or_else(|e| {
                error!(error = %e, "computing next tick failed");
                interval
            });
            tokio::time::sleep(delay).await;

            match engine.tick().await {
                Ok(Some(status)) => debug!(pending = status.pending_count, "sync tick"),
                Ok(None) => {}
                Err(e) => error!(error = %e, "sync tick failed"),
            }
        }
    })
}

/// Drains the queue every time connectivity comes back.
pub fn spawn_reconnect_listener(engine: Arc<SyncEngine>) -> JoinHandle<()> {
    let mut events = engine.monitor().subscribe();

    tokio::spawn(async move {
        loop {
            let restored = match events.recv().await {
                Ok(ConnectivityEvent::BecameReachable) => true,
                Ok(ConnectivityEvent::BecameUnreachable) => false,
                // Missed edges; fall back to the current level
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "connectivity events lagged");
                    engine.monitor().is_reachable()
                }
                Err(RecvError::Closed) => break,
            };

            if restored {
                if let Err(e) = engine.on_connectivity_restored().await {
                    error!(error = %e, "drain after reconnect failed");
                }
            }
        }
    })
}
