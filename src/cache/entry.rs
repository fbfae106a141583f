//! Cache Entry Module
//!
//! Per-key value plus staleness, fetch and observer metadata.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

// == Fetch Status ==
/// Whether any fetch for the entry is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Idle,
    Fetching,
}

// == Cache Entry ==
/// A cached query result and its bookkeeping.
///
/// Only [`CacheStore`](crate::cache::CacheStore) mutates entries.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Last successfully fetched value
    pub data: Option<V>,
    /// Monotonic time of the last successful fetch
    pub fetched_at: Option<Instant>,
    /// Wall-clock time of the last successful fetch, for diagnostics
    pub updated_at: Option<DateTime<Utc>>,
    /// Explicitly marked stale by an invalidation
    pub invalidated: bool,
    /// Bumped on every invalidation
    pub generation: u64,
    /// Fetches currently in flight
    pub fetching: usize,
    /// Consecutive failed fetch attempts
    pub failure_count: u32,
    pub last_error: Option<String>,
    /// Active readers
    pub observers: usize,
    /// When the observer count last reached zero
    pub unobserved_since: Instant,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an empty entry with no data and no observers.
    pub fn empty() -> Self {
        Self {
            data: None,
            fetched_at: None,
            updated_at: None,
            invalidated: false,
            generation: 0,
            fetching: 0,
            failure_count: 0,
            last_error: None,
            observers: 0,
            unobserved_since: Instant::now(),
        }
    }

    /// Creates an entry holding a freshly fetched value.
    pub fn with_value(value: V) -> Self {
        let mut entry = Self::empty();
        entry.store(value);
        entry
    }

    // == Store ==
    /// Records a successful fetch result.
    pub fn store(&mut self, value: V) {
        self.data = Some(value);
        self.fetched_at = Some(Instant::now());
        self.updated_at = Some(Utc::now());
        self.invalidated = false;
        self.failure_count = 0;
        self.last_error = None;
    }

    pub fn status(&self) -> FetchStatus {
        if self.fetching > 0 {
            FetchStatus::Fetching
        } else {
            FetchStatus::Idle
        }
    }

    // == Is Stale ==
    /// Checks whether the next read must refetch.
    ///
    /// An entry is stale when it has no data, was invalidated, or its last
    /// fetch is at least `stale_time` old. A zero `stale_time` makes every
    /// entry stale immediately.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        if self.invalidated || self.data.is_none() {
            return true;
        }
        match self.fetched_at {
            Some(at) => at.elapsed() >= stale_time,
            None => true,
        }
    }

    /// Returns the value only if it can be served without refetching.
    pub fn fresh_value(&self, stale_time: Duration) -> Option<&V> {
        if self.is_stale(stale_time) {
            None
        } else {
            self.data.as_ref()
        }
    }

    /// True once the entry has had no observers for at least `gc_time` and
    /// no fetch is in flight.
    pub fn is_collectable(&self, gc_time: Duration) -> bool {
        self.observers == 0
            && self.fetching == 0
            && self.unobserved_since.elapsed() >= gc_time
    }
}
