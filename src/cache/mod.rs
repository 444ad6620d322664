//! Cache Module
//!
//! Durable cache of read responses with coarse, time-based expiration.

mod entry;
mod key;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use key::{normalize_path, split_query, CacheKey, QueryParams};
pub use stats::CacheStats;
pub use store::{CacheStore, DEFAULT_TTL_DAYS};
