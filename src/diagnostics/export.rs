//! Diagnostics export document.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diagnostics::{LogBuffer, LogEvent};
use crate::error::Result;
use crate::queue::{ItemStatus, QueueItem, SyncQueue};
use crate::status::{StatusReporter, StatusSnapshot};

/// Failed items included in an export.
const EXPORTED_FAILED_ITEMS: usize = 100;

/// Everything support needs to understand the local offline state.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsExport {
    pub exported_at: DateTime<Utc>,
    pub status: StatusSnapshot,
    pub failed_items: Vec<QueueItem>,
    pub events: Vec<LogEvent>,
}

impl DiagnosticsExport {
    pub fn collect(
        now: DateTime<Utc>,
        reporter: &StatusReporter,
        queue: &SyncQueue,
        logs: &LogBuffer,
    ) -> Result<Self> {
        Ok(Self {
            exported_at: now,
            status: reporter.snapshot()?,
            failed_items: queue.list(Some(ItemStatus::Failed), EXPORTED_FAILED_ITEMS)?,
            events: logs.snapshot(),
        })
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
