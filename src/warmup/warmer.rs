//! Pre-Cache Warmer
//!
//! Walks a manifest of read endpoints and stores every response in the cache
//! so the data is there before the network goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::clock::SharedClock;
use crate::error::{EngineError, Result};
use crate::transport::{with_deadline, Transport};
use crate::warmup::{Manifest, ManifestEntry};

/// Query parameter carrying the page number of a paginated entry.
pub const PAGE_PARAM: &str = "page";

// == Summary ==
/// Result of warming one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryOutcome {
    pub endpoint: String,
    pub pages_cached: u32,
    pub error: Option<String>,
}

impl EntryOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-entry outcomes of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmupSummary {
    pub entries: Vec<EntryOutcome>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WarmupSummary {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    pub fn pages_cached(&self) -> u32 {
        self.entries.iter().map(|e| e.pages_cached).sum()
    }
}

/// Observable warmer state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmupState {
    pub running: bool,
    pub completed: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_summary: Option<WarmupSummary>,
}

#[derive(Debug, Default)]
struct Flags {
    completed: bool,
    last_run_at: Option<DateTime<Utc>>,
    last_summary: Option<WarmupSummary>,
}

// == Warmer ==
pub struct PreCacheWarmer {
    cache: CacheStore,
    transport: Arc<dyn Transport>,
    clock: SharedClock,
    request_timeout: Duration,
    running: AtomicBool,
    cancel_requested: AtomicBool,
    flags: Mutex<Flags>,
}

/// Clears the running flag however the run ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PreCacheWarmer {
    pub fn new(
        cache: CacheStore,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
        request_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            transport,
            clock,
            request_timeout,
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            flags: Mutex::new(Flags::default()),
        }
    }

    // == Run ==
    /// Warms every manifest entry in order.
    ///
    /// `on_progress(current, total)` fires once per entry. A failed entry is
    /// recorded and skipped; a cancellation stops before the next entry and
    /// keeps what was already cached. Only storage faults abort the run.
    pub async fn run<F>(&self, manifest: &Manifest, mut on_progress: F) -> Result<WarmupSummary>
    where
        F: FnMut(usize, usize) + Send,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::WarmupRunning);
        }
        let _guard = RunGuard(&self.running);
        self.cancel_requested.store(false, Ordering::SeqCst);

        let started_at = self.clock.now();
        let total = manifest.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;

        info!(entries = total, "warm-up started");

        for (index, entry) in manifest.entries.iter().enumerate() {
            if self.cancel_requested.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }

            outcomes.push(self.warm_entry(entry).await?);
            on_progress(index + 1, total);
        }

        let summary = WarmupSummary {
            entries: outcomes,
            cancelled,
            started_at,
            finished_at: self.clock.now(),
        };

        {
            let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
            flags.last_run_at = Some(summary.finished_at);
            if !cancelled {
                flags.completed = true;
            }
            flags.last_summary = Some(summary.clone());
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            pages = summary.pages_cached(),
            cancelled,
            "warm-up finished"
        );
        Ok(summary)
    }

    async fn warm_entry(&self, entry: &ManifestEntry) -> Result<EntryOutcome> {
        let mut outcome = EntryOutcome {
            endpoint: entry.endpoint.clone(),
            pages_cached: 0,
            error: None,
        };

        if entry.page_limit() == 0 {
            warn!(endpoint = %entry.endpoint, "warm-up entry declares zero pages");
            outcome.error = Some("page_count must be at least 1".to_string());
            return Ok(outcome);
        }

        for page in 1..=entry.page_limit() {
            let mut params = entry.params.clone();
            if entry.paginated {
                params.insert(PAGE_PARAM.to_string(), page.to_string());
            }

            let body = match with_deadline(
                self.request_timeout,
                self.transport.fetch(&entry.endpoint, &params),
            )
            .await
            {
                Ok(body) => body,
                Err(e) => {
                    warn!(endpoint = %entry.endpoint, page, error = %e, "warm-up entry failed");
                    outcome.error = Some(e.to_string());
                    break;
                }
            };

            let empty = entry.paginated && is_empty_page(&body);
            if empty && page > 1 {
                break;
            }

            let key = CacheKey::normalize(&entry.endpoint, &params);
            self.cache.put(key.as_str(), body, None)?;
            outcome.pages_cached += 1;
            debug!(key = %key, "pre-cached");

            if empty {
                break;
            }
        }
        Ok(outcome)
    }

    // == Control ==
    /// Asks the run in flight to stop before its next entry.
    pub fn cancel(&self) -> bool {
        let running = self.is_running();
        if running {
            self.cancel_requested.store(true, Ordering::SeqCst);
            info!("warm-up cancellation requested");
        }
        running
    }

    /// Forgets the completion flag; the cache keeps its entries.
    pub fn reset(&self) {
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        *flags = Flags::default();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.flags.lock().unwrap_or_else(|e| e.into_inner()).completed
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.flags.lock().unwrap_or_else(|e| e.into_inner()).last_run_at
    }

    pub fn state(&self) -> WarmupState {
        let flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        WarmupState {
            running: self.is_running(),
            completed: flags.completed,
            last_run_at: flags.last_run_at,
            last_summary: flags.last_summary.clone(),
        }
    }
}

/// Whether a page body marks the end of a paginated listing.
pub fn is_empty_page(body: &[u8]) -> bool {
    if body.iter().all(u8::is_ascii_whitespace) {
        return true;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) => true,
        Ok(Value::Array(items)) => items.is_empty(),
        Ok(Value::Object(fields)) => ["data", "items", "results"]
            .iter()
            .filter_map(|name| fields.get(*name))
            .any(|value| matches!(value, Value::Array(items) if items.is_empty())),
        _ => false,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TransportError;
    use crate::storage::Database;
    use crate::test_support::MockTransport;

    fn warmer() -> (Arc<PreCacheWarmer>, Arc<MockTransport>, CacheStore) {
        let clock = ManualClock::starting_now();
        let cache = CacheStore::new(Database::in_memory().unwrap(), clock.clone(), chrono::Duration::days(30));
        let transport = Arc::new(MockTransport::new());
        let warmer = Arc::new(PreCacheWarmer::new(
            cache.clone(),
            transport.clone(),
            clock,
            Duration::from_secs(5),
        ));
        (warmer, transport, cache)
    }

    #[test]
    fn test_empty_page_detection() {
        assert!(is_empty_page(b""));
        assert!(is_empty_page(b"  \n"));
        assert!(is_empty_page(b"null"));
        assert!(is_empty_page(b"[]"));
        assert!(is_empty_page(br#"{"data": [], "total": 40}"#));
        assert!(is_empty_page(br#"{"results": []}"#));

        assert!(!is_empty_page(b"[1]"));
        assert!(!is_empty_page(br#"{"items": [{"id": 1}]}"#));
        assert!(!is_empty_page(br#"{"id": 1}"#));
        assert!(!is_empty_page(b"not json"));
    }

    #[tokio::test]
    async fn test_pagination_stops_at_empty_page() {
        let (warmer, transport, cache) = warmer();
        transport.serve("/patients?page=1", b"[1,2]");
        transport.serve("/patients?page=2", b"[3]");
        transport.serve("/patients?page=3", b"[]");

        let manifest = Manifest::new(vec![ManifestEntry::paginated("/patients", None)]);
        let summary = warmer.run(&manifest, |_, _| {}).await.unwrap();

        assert_eq!(summary.entries[0].pages_cached, 2);
        assert!(cache.get("/patients?page=2").unwrap().is_some());
        assert!(cache.peek("/patients?page=3").unwrap().is_none());
        assert_eq!(transport.fetched().len(), 3);
    }

    #[tokio::test]
    async fn test_pagination_honours_page_count() {
        let (warmer, transport, _) = warmer();
        for page in 1..=5 {
            transport.serve(&format!("/roles?page={}", page), b"[1]");
        }

        let manifest = Manifest::new(vec![ManifestEntry::paginated("/roles", Some(2))]);
        let summary = warmer.run(&manifest, |_, _| {}).await.unwrap();

        assert_eq!(summary.pages_cached(), 2);
        assert_eq!(transport.fetched(), vec!["/roles?page=1", "/roles?page=2"]);
    }

    #[tokio::test]
    async fn test_zero_page_entry_counts_as_failure() {
        let (warmer, transport, _) = warmer();

        let manifest = Manifest::new(vec![ManifestEntry::paginated("/roles", Some(0))]);
        let summary = warmer.run(&manifest, |_, _| {}).await.unwrap();

        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.pages_cached(), 0);
        assert!(transport.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_failed_entry_is_skipped() {
        let (warmer, transport, cache) = warmer();
        transport.serve("/a", b"A");
        transport.serve("/c", b"C");
        transport.script_fetch("/b", Err(TransportError::Timeout));

        let manifest = Manifest::new(vec![
            ManifestEntry::single("/a"),
            ManifestEntry::single("/b"),
            ManifestEntry::single("/c"),
        ]);

        let mut progress = Vec::new();
        let summary = warmer
            .run(&manifest, |current, total| progress.push((current, total)))
            .await
            .unwrap();

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert!(cache.get("/c").unwrap().is_some());
        assert!(warmer.is_completed());
        assert!(warmer.last_run_at().is_some());
    }

    #[tokio::test]
    async fn test_cancel_between_entries() {
        let (warmer, transport, cache) = warmer();
        transport.serve("/a", b"A");
        transport.serve("/b", b"B");

        let manifest = Manifest::new(vec![ManifestEntry::single("/a"), ManifestEntry::single("/b")]);
        let handle = Arc::clone(&warmer);
        let summary = warmer
            .run(&manifest, move |_, _| {
                handle.cancel();
            })
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.entries.len(), 1);
        assert!(cache.get("/a").unwrap().is_some());
        assert!(cache.peek("/b").unwrap().is_none());
        assert!(!warmer.is_completed());
        assert!(!warmer.is_running());
    }

    #[tokio::test]
    async fn test_reset_keeps_cache() {
        let (warmer, transport, cache) = warmer();
        transport.serve("/a", b"A");

        warmer
            .run(&Manifest::new(vec![ManifestEntry::single("/a")]), |_, _| {})
            .await
            .unwrap();
        warmer.reset();

        assert!(!warmer.is_completed());
        assert!(warmer.last_run_at().is_none());
        assert!(cache.get("/a").unwrap().is_some());
    }

    #[test]
    fn test_cancel_without_run_is_noop() {
        let (warmer, _, _) = warmer();
        assert!(!warmer.cancel());
    }
}
