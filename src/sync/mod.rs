//! Sync Module
//!
//! Replays queued writes against the remote service.

mod engine;
mod retry;

pub use engine::{EngineSettings, SyncEngine, DEFAULT_BATCH_SIZE, MIN_TICK_DELAY};
pub use retry::{RetryDecision, RetryPolicy};
