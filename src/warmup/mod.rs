//! Warm-up Module
//!
//! Proactive population of the cache from a manifest of read endpoints.

mod manifest;
mod warmer;

pub use manifest::{Manifest, ManifestEntry, MAX_PAGES};
pub use warmer::{is_empty_page, EntryOutcome, PreCacheWarmer, WarmupState, WarmupSummary, PAGE_PARAM};
