//! offline_sync - Offline-first cache and write queue
//!
//! Keeps prior server responses readable while disconnected, captures writes
//! in a durable queue and replays them in per-resource order once the remote
//! service is reachable again.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod queue;
pub mod reader;
pub mod status;
pub mod storage;
pub mod sync;
pub mod tasks;
pub mod transport;
pub mod warmup;

#[cfg(test)]
mod test_support;

pub use api::{create_router, AppState};
pub use cache::{CacheEntry, CacheKey, CacheStore, QueryParams};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use error::{EngineError, Result, StoreError, TransportError};
pub use queue::{DuplicatePolicy, ItemStatus, Operation, QueueItem, SyncQueue, SyncStatus};
pub use reader::{OfflineReader, ReadResult, ReadSource};
pub use status::{StatusReporter, StatusSnapshot};
pub use storage::Database;
pub use sync::{EngineSettings, RetryPolicy, SyncEngine};
pub use transport::{Ack, HttpTransport, Transport};
pub use warmup::{Manifest, ManifestEntry, PreCacheWarmer, WarmupSummary};
