//! Configuration Module
//!
//! Handles loading and managing daemon configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_TTL_DAYS;
use crate::queue::DuplicatePolicy;
use crate::sync::{EngineSettings, RetryPolicy};

/// Daemon configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file holding the cache and the queue
    pub db_path: PathBuf,
    /// Base URL of the remote service
    pub remote_base_url: String,
    /// Path probed to decide reachability
    pub probe_path: String,
    /// Local API port
    pub server_port: u16,
    /// Default freshness horizon of cached responses, in seconds
    pub cache_ttl_secs: u64,
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub batch_size: usize,
    pub request_timeout_secs: u64,
    pub sync_interval_secs: u64,
    pub probe_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// How long completed queue items are kept for audit
    pub completed_retention_secs: u64,
    pub status_interval_secs: u64,
    pub log_buffer_capacity: usize,
    /// Manifest warmed once at startup, if set
    pub warmup_manifest: Option<PathBuf>,
    pub duplicate_policy: DuplicatePolicy,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duplicate_policy(value: &str) -> Option<DuplicatePolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "allow" => Some(DuplicatePolicy::Allow),
        "coalesce" | "coalesce_pending" => Some(DuplicatePolicy::CoalescePending),
        _ => None,
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Unset or unparsable variables fall back to `Config::default()`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env::var("OFFLINE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            remote_base_url: env::var("REMOTE_BASE_URL").unwrap_or(defaults.remote_base_url),
            probe_path: env::var("PROBE_PATH").unwrap_or(defaults.probe_path),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_ttl_secs: env_or("CACHE_TTL_SECS", defaults.cache_ttl_secs),
            max_attempts: env_or("MAX_ATTEMPTS", defaults.max_attempts),
            backoff_initial_ms: env_or("BACKOFF_INITIAL_MS", defaults.backoff_initial_ms),
            backoff_max_ms: env_or("BACKOFF_MAX_MS", defaults.backoff_max_ms),
            batch_size: env_or("BATCH_SIZE", defaults.batch_size),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            sync_interval_secs: env_or("SYNC_INTERVAL_SECS", defaults.sync_interval_secs),
            probe_interval_secs: env_or("PROBE_INTERVAL_SECS", defaults.probe_interval_secs),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            completed_retention_secs: env_or("COMPLETED_RETENTION_SECS", defaults.completed_retention_secs),
            status_interval_secs: env_or("STATUS_INTERVAL_SECS", defaults.status_interval_secs),
            log_buffer_capacity: env_or("LOG_BUFFER_CAPACITY", defaults.log_buffer_capacity),
            warmup_manifest: env::var("WARMUP_MANIFEST")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            duplicate_policy: env::var("DUPLICATE_POLICY")
                .ok()
                .and_then(|v| parse_duplicate_policy(&v))
                .unwrap_or(defaults.duplicate_policy),
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.max(1) as i64)
    }

    pub fn completed_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.completed_retention_secs as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.backoff_initial_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms.max(self.backoff_initial_ms)),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            batch_size: self.batch_size.max(1),
            request_timeout: self.request_timeout(),
            retry: self.retry_policy(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("offline_sync.db"),
            remote_base_url: "http://localhost:8080".to_string(),
            probe_path: "/".to_string(),
            server_port: 3000,
            cache_ttl_secs: DEFAULT_TTL_DAYS as u64 * 24 * 3600,
            max_attempts: 5,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 300_000,
            batch_size: 16,
            request_timeout_secs: 30,
            sync_interval_secs: 30,
            probe_interval_secs: 15,
            sweep_interval_secs: 3600,
            completed_retention_secs: 7 * 24 * 3600,
            status_interval_secs: 5,
            log_buffer_capacity: 500,
            warmup_manifest: None,
            duplicate_policy: DuplicatePolicy::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cache_ttl(), chrono::Duration::days(30));
        assert_eq!(config.completed_retention(), chrono::Duration::days(7));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Allow);
        assert!(config.warmup_manifest.is_none());
    }

    #[test]
    fn test_config_from_env() {
        // Only this test touches these variables
        env::set_var("BATCH_SIZE", "4");
        env::set_var("MAX_ATTEMPTS", "not-a-number");
        env::set_var("DUPLICATE_POLICY", "Coalesce");

        let config = Config::from_env();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::CoalescePending);

        env::remove_var("BATCH_SIZE");
        env::remove_var("MAX_ATTEMPTS");
        env::remove_var("DUPLICATE_POLICY");
    }

    #[test]
    fn test_engine_settings_clamps_zero_values() {
        let config = Config {
            batch_size: 0,
            max_attempts: 0,
            ..Config::default()
        };
        let settings = config.engine_settings();
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.retry.max_attempts, 1);
    }
}
