//! Connectivity Monitor
//!
//! Tracks whether the remote service is reachable. The current value is a
//! `watch` signal; transitions are also broadcast as edge events so the sync
//! engine can react exactly once per reconnect.

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 16;

/// Edge between the two connectivity states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityEvent {
    BecameReachable,
    BecameUnreachable,
}

/// Shared reachable/unreachable signal.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: std::sync::Arc<watch::Sender<bool>>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    /// Starts in the given state.
    pub fn new(initially_reachable: bool) -> Self {
        let (state, _) = watch::channel(initially_reachable);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: std::sync::Arc::new(state),
            events,
        }
    }

    pub fn is_reachable(&self) -> bool {
        *self.state.borrow()
    }

    /// Records the observed state. Returns the edge event when it changed.
    pub fn set_reachable(&self, reachable: bool) -> Option<ConnectivityEvent> {
        let changed = self.state.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });

        if !changed {
            return None;
        }

        let event = if reachable {
            info!("remote became reachable");
            ConnectivityEvent::BecameReachable
        } else {
            warn!("remote became unreachable");
            ConnectivityEvent::BecameUnreachable
        };
        // No receivers is fine; the watch value is still updated
        let _ = self.events.send(event);
        Some(event)
    }

    /// Receiver of the current state.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Receiver of future edge events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
