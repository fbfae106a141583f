//! Configuration Module
//!
//! Loads the cache policy and realtime wiring from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::CachePolicy;
use crate::realtime::InvalidationRules;

/// Host configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Milliseconds a fetched entry stays fresh
    pub stale_time_ms: u64,
    /// Automatic retries after a failed fetch
    pub retry: u32,
    /// Whether regaining focus refetches stale observed entries
    pub refetch_on_focus: bool,
    /// Milliseconds an unobserved entry is retained before eviction
    pub gc_time_ms: u64,
    /// Garbage-collection sweep interval in seconds
    pub gc_interval: u64,
    /// Diagnostics HTTP server port
    pub server_port: u16,
    /// Row column the change stream is scoped on
    pub owner_column: String,
    /// Identity the host subscribes for, if any
    pub user_id: Option<String>,
    /// Table to key-prefix mapping
    pub invalidation_rules: InvalidationRules,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `STALE_TIME_MS` - Freshness window (default: 60000)
    /// - `QUERY_RETRY` - Retry attempts after a failed fetch (default: 1)
    /// - `REFETCH_ON_FOCUS` - Refetch stale entries on focus (default: false)
    /// - `GC_TIME_MS` - Retention of unobserved entries (default: 300000)
    /// - `GC_INTERVAL` - Sweep frequency in seconds, at least 1 (default: 1)
    /// - `SERVER_PORT` - Diagnostics port (default: 3000)
    /// - `OWNER_COLUMN` - Scoping column (default: owner_id)
    /// - `DASHBOARD_USER_ID` - Identity to subscribe for (default: none)
    /// - `INVALIDATION_RULES` - JSON object of table to key prefixes (default: dashboard rules)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let invalidation_rules = match env::var("INVALIDATION_RULES") {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(rules) => rules,
                Err(e) => {
                    warn!("Ignoring malformed INVALIDATION_RULES: {}", e);
                    defaults.invalidation_rules.clone()
                }
            },
            Err(_) => defaults.invalidation_rules.clone(),
        };

        Self {
            stale_time_ms: parse_var("STALE_TIME_MS").unwrap_or(defaults.stale_time_ms),
            retry: parse_var("QUERY_RETRY").unwrap_or(defaults.retry),
            refetch_on_focus: parse_var("REFETCH_ON_FOCUS").unwrap_or(defaults.refetch_on_focus),
            gc_time_ms: parse_var("GC_TIME_MS").unwrap_or(defaults.gc_time_ms),
            gc_interval: parse_var("GC_INTERVAL")
                .filter(|&secs: &u64| secs > 0)
                .unwrap_or(defaults.gc_interval),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            owner_column: env::var("OWNER_COLUMN").unwrap_or(defaults.owner_column),
            user_id: env::var("DASHBOARD_USER_ID")
                .ok()
                .filter(|id| !id.trim().is_empty()),
            invalidation_rules,
        }
    }

    /// GC sweep period; never shorter than one second.
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval.max(1))
    }

    /// Builds the cache policy these settings describe.
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            stale_time: Duration::from_millis(self.stale_time_ms),
            retry: self.retry,
            refetch_on_focus: self.refetch_on_focus,
            gc_time: Duration::from_millis(self.gc_time_ms),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let policy = CachePolicy::default();
        Self {
            stale_time_ms: policy.stale_time.as_millis() as u64,
            retry: policy.retry,
            refetch_on_focus: policy.refetch_on_focus,
            gc_time_ms: policy.gc_time.as_millis() as u64,
            gc_interval: 1,
            server_port: 3000,
            owner_column: "owner_id".to_string(),
            user_id: None,
            invalidation_rules: InvalidationRules::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.stale_time_ms, 60_000);
        assert_eq!(config.retry, 1);
        assert!(!config.refetch_on_focus);
        assert_eq!(config.gc_time_ms, 300_000);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.owner_column, "owner_id");
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        for name in [
            "STALE_TIME_MS",
            "QUERY_RETRY",
            "REFETCH_ON_FOCUS",
            "GC_TIME_MS",
            "GC_INTERVAL",
            "SERVER_PORT",
            "OWNER_COLUMN",
            "DASHBOARD_USER_ID",
            "INVALIDATION_RULES",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.cache_policy(), CachePolicy::default());
        assert_eq!(config.gc_interval, 1);
        assert_eq!(config.owner_column, "owner_id");
        assert!(config.invalidation_rules.contains_table("activities"));
    }

    #[test]
    fn test_zero_gc_interval_is_clamped() {
        let config = Config {
            gc_interval: 0,
            ..Config::default()
        };
        assert_eq!(config.gc_interval(), Duration::from_secs(1));

        let config = Config {
            gc_interval: 30,
            ..Config::default()
        };
        assert_eq!(config.gc_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_cache_policy_conversion() {
        let config = Config {
            stale_time_ms: 1500,
            retry: 3,
            refetch_on_focus: true,
            gc_time_ms: 0,
            ..Config::default()
        };

        let policy = config.cache_policy();
        assert_eq!(policy.stale_time, Duration::from_millis(1500));
        assert_eq!(policy.retry, 3);
        assert!(policy.refetch_on_focus);
        assert!(policy.gc_time.is_zero());
    }
}
