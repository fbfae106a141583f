//! Cache Policy Module
//!
//! Process-wide defaults applied to every cache entry.

use std::time::Duration;

/// Upper bound on the back-off between fetch retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

// == Cache Policy ==
/// Staleness, retry, focus and retention settings shared by all entries.
///
/// Fixed when the [`QueryClient`](crate::cache::QueryClient) is built;
/// there is no per-key override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a fetched value is served without refetching
    pub stale_time: Duration,
    /// Automatic retry attempts after a failed fetch
    pub retry: u32,
    /// Whether regaining focus refetches stale observed entries
    pub refetch_on_focus: bool,
    /// How long an entry with no observers is kept
    pub gc_time: Duration,
}

impl CachePolicy {
    /// Policy for test harnesses: no retries and immediate collection.
    pub fn for_tests() -> Self {
        Self {
            retry: 0,
            gc_time: Duration::ZERO,
            ..Self::default()
        }
    }

    // == Retry Delay ==
    /// Back-off before retry number `attempt` (zero-based): `min(1s * 2^attempt, 30s)`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(factor).min(MAX_RETRY_DELAY)
    }

    /// Total fetch attempts allowed for one read.
    pub fn max_attempts(&self) -> u32 {
        self.retry.saturating_add(1)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(60),
            retry: 1,
            refetch_on_focus: false,
            gc_time: Duration::from_secs(5 * 60),
        }
    }
}
