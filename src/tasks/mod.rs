//! Background Tasks Module
//!
//! Long-running loops started by the daemon.
//!
//! # Tasks
//! - Maintenance: expiration sweep and completed-item purge
//! - Sync ticker: periodic drain safety net
//! - Reconnect listener: drain on the "became reachable" edge
//! - Probe: feeds the connectivity monitor

mod maintenance;
mod probe;
mod sync_tick;

pub use maintenance::{run_maintenance, spawn_maintenance_task, MaintenanceReport};
pub use probe::spawn_probe_task;
pub use sync_tick::{spawn_reconnect_listener, spawn_sync_ticker};
