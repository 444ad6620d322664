//! Cache Statistics Module
//!
//! Entry counts for the response cache.

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Rows currently stored, expired ones included
    pub entries: u64,
    /// Rows still within their horizon
    pub live: u64,
    /// Rows past their horizon awaiting the next sweep
    pub expired: u64,
}
