//! Cache Store Module
//!
//! Keyed query results with per-key staleness, fetch and observer tracking.
//! Every operation touches one key at a time, except the prefix-wide
//! invalidation and the GC sweep, which still mutate each entry independently.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::{CacheEntry, CacheKey, CachePolicy, CacheStats, FetchStatus, MAX_KEY_DEPTH};
use crate::error::{CacheError, Result};

// == Lookup ==
/// Outcome of a read that may need to go to the remote service.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    /// Served from cache within `stale_time`
    Fresh(V),
    /// Caller must fetch; pass `generation` back to [`CacheStore::complete_fetch`]
    Fetch { generation: u64 },
}

// == Entry Snapshot ==
/// Value-free view of an entry for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    pub has_data: bool,
    pub stale: bool,
    pub invalidated: bool,
    pub status: FetchStatus,
    pub observers: usize,
    pub failure_count: u32,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// == Cache Store ==
/// Query result storage governed by one [`CachePolicy`].
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    stats: CacheStats,
    policy: CachePolicy,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates an empty store. The policy cannot be changed afterwards.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    // == Get ==
    /// Returns the last known value for `key`, fresh or stale.
    ///
    /// Never fetches and never creates an entry. Counts a hit only when the
    /// value is still fresh.
    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        let stale_time = self.policy.stale_time;
        match self.entries.get(key) {
            Some(entry) => {
                if entry.is_stale(stale_time) {
                    self.stats.record_miss();
                } else {
                    self.stats.record_hit();
                }
                entry.data.clone()
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key` as freshly fetched, creating the entry if needed.
    pub fn set(&mut self, key: CacheKey, value: V) -> Result<()> {
        validate_key(&key)?;
        self.entries
            .entry(key)
            .or_insert_with(CacheEntry::empty)
            .store(value);
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    // == Lookup Or Begin Fetch ==
    /// Serves a fresh value, or creates the entry if absent and marks it fetching.
    pub fn lookup_or_begin_fetch(&mut self, key: &CacheKey) -> Result<Lookup<V>> {
        validate_key(key)?;
        let stale_time = self.policy.stale_time;
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::empty);

        let lookup = match entry.fresh_value(stale_time).cloned() {
            Some(value) => Lookup::Fresh(value),
            None => {
                entry.fetching += 1;
                Lookup::Fetch {
                    generation: entry.generation,
                }
            }
        };

        match lookup {
            Lookup::Fresh(_) => self.stats.record_hit(),
            Lookup::Fetch { .. } => self.stats.record_miss(),
        }
        self.stats.set_total_entries(self.entries.len());
        Ok(lookup)
    }

    // == Complete Fetch ==
    /// Stores the result of a fetch that started at `generation`.
    ///
    /// If the entry was invalidated while the fetch was in flight, the value is
    /// kept but the entry stays stale so the next read refetches.
    pub fn complete_fetch(&mut self, key: &CacheKey, value: V, generation: u64) {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::empty);
        entry.store(value);
        entry.fetching = entry.fetching.saturating_sub(1);
        if entry.generation != generation {
            entry.invalidated = true;
        }
        self.stats.record_fetch();
        self.stats.set_total_entries(self.entries.len());
    }

    // == Record Failure ==
    /// Records one failed fetch attempt. Existing data is left untouched.
    pub fn record_failure(&mut self, key: &CacheKey, message: impl Into<String>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.failure_count += 1;
            entry.last_error = Some(message.into());
        }
        self.stats.record_fetch_failure();
    }

    /// Ends one in-flight fetch that gave up or was dropped.
    pub fn abort_fetch(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.fetching = entry.fetching.saturating_sub(1);
        }
    }

    // == Invalidate ==
    /// Marks every entry whose key starts with `prefix` as stale.
    ///
    /// Data is retained and nothing is evicted. Returns the number of entries marked.
    pub fn invalidate(&mut self, prefix: &CacheKey) -> usize {
        let mut count = 0;
        for (key, entry) in self.entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.invalidated = true;
                entry.generation += 1;
                count += 1;
            }
        }
        self.stats.record_invalidations(count);
        count
    }

    // == Observers ==
    /// Registers an active reader, creating the entry if needed.
    pub fn add_observer(&mut self, key: &CacheKey) -> Result<()> {
        validate_key(key)?;
        self.entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::empty)
            .observers += 1;
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    /// Drops one active reader.
    ///
    /// With a zero `gc_time` the entry is removed as soon as it becomes
    /// collectable. Returns true if it was removed.
    pub fn remove_observer(&mut self, key: &CacheKey) -> bool {
        let gc_time = self.policy.gc_time;
        let collectable = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.observers = entry.observers.saturating_sub(1);
                if entry.observers == 0 {
                    entry.unobserved_since = Instant::now();
                }
                gc_time.is_zero() && entry.is_collectable(gc_time)
            }
            None => false,
        };

        if collectable {
            self.entries.remove(key);
            self.stats.record_evictions(1);
            self.stats.set_total_entries(self.entries.len());
        }
        collectable
    }

    // == Evict Unobserved ==
    /// Removes entries that have had no observers for `gc_time`.
    ///
    /// Returns the number of entries removed.
    pub fn evict_unobserved(&mut self) -> usize {
        let gc_time = self.policy.gc_time;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_collectable(gc_time));
        let removed = before - self.entries.len();

        self.stats.record_evictions(removed);
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Focus ==
    /// Keys of observed entries that are stale, in key order.
    pub fn stale_observed_keys(&self) -> Vec<CacheKey> {
        let stale_time = self.policy.stale_time;
        let mut keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.observers > 0 && entry.is_stale(stale_time))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn entry(&self, key: &CacheKey) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// True if the next read of `key` would fetch. Absent keys are stale.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .map_or(true, |entry| entry.is_stale(self.policy.stale_time))
    }

    /// Value-free view of all entries, sorted by key.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        let stale_time = self.policy.stale_time;
        let mut entries: Vec<EntrySnapshot> = self
            .entries
            .iter()
            .map(|(key, entry)| EntrySnapshot {
                key: key.clone(),
                has_data: entry.data.is_some(),
                stale: entry.is_stale(stale_time),
                invalidated: entry.invalidated,
                status: entry.status(),
                observers: entry.observers,
                failure_count: entry.failure_count,
                updated_at: entry.updated_at,
                last_error: entry.last_error.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_key(key: &CacheKey) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must have at least one segment".into()));
    }
    if key.depth() > MAX_KEY_DEPTH {
        return Err(CacheError::InvalidKey(format!(
            "key {} exceeds maximum depth of {}",
            key, MAX_KEY_DEPTH
        )));
    }
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store() -> CacheStore<String> {
        CacheStore::new(CachePolicy::default())
    }

    fn key(parts: &[&str]) -> CacheKey {
        CacheKey::new(parts.iter().copied())
    }

    #[test]
    fn test_store_new() {
        let store = store();
        assert!(store.is_empty());
        assert_eq!(store.policy(), &CachePolicy::default());
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store();

        store.set(key(&["activities"]), "a1".to_string()).unwrap();

        assert_eq!(store.get(&key(&["activities"])), Some("a1".to_string()));
        assert!(!store.is_stale(&key(&["activities"])));
        assert_eq!(store.stats().hits, 1);
    }

    #[test]
    fn test_store_get_missing_does_not_create() {
        let mut store = store();

        assert_eq!(store.get(&key(&["clients"])), None);
        assert!(store.is_empty());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_rejects_invalid_keys() {
        let mut store = store();

        let result = store.set(CacheKey::root(), "v".to_string());
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));

        let deep = CacheKey::new((0..=MAX_KEY_DEPTH).map(|i| i.to_string()));
        let result = store.lookup_or_begin_fetch(&deep);
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_invalidate_prefix_marks_stale_and_keeps_data() {
        let mut store = store();
        store.set(key(&["user-settings", "u1"]), "s1".to_string()).unwrap();
        store.set(key(&["user-settings", "u2"]), "s2".to_string()).unwrap();
        store.set(key(&["projects"]), "p".to_string()).unwrap();

        let marked = store.invalidate(&key(&["user-settings"]));

        assert_eq!(marked, 2);
        assert!(store.is_stale(&key(&["user-settings", "u1"])));
        assert!(store.is_stale(&key(&["user-settings", "u2"])));
        assert!(!store.is_stale(&key(&["projects"])));
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.get(&key(&["user-settings", "u1"])),
            Some("s1".to_string())
        );
        assert_eq!(store.stats().invalidations, 2);
    }

    #[test]
    fn test_invalidate_unknown_prefix_is_noop() {
        let mut store = store();
        store.set(key(&["projects"]), "p".to_string()).unwrap();

        assert_eq!(store.invalidate(&key(&["invoices"])), 0);
        assert!(!store.is_stale(&key(&["projects"])));
    }

    #[test]
    fn test_lookup_fresh_then_fetch_after_invalidate() {
        let mut store = store();
        let k = key(&["activities"]);
        store.set(k.clone(), "a".to_string()).unwrap();

        assert_eq!(
            store.lookup_or_begin_fetch(&k).unwrap(),
            Lookup::Fresh("a".to_string())
        );

        store.invalidate(&k);
        let lookup = store.lookup_or_begin_fetch(&k).unwrap();
        assert!(matches!(lookup, Lookup::Fetch { generation: 1 }));
        assert_eq!(store.entry(&k).unwrap().status(), FetchStatus::Fetching);
    }

    #[test]
    fn test_complete_fetch_after_midflight_invalidation_stays_stale() {
        let mut store = store();
        let k = key(&["activities"]);

        let generation = match store.lookup_or_begin_fetch(&k).unwrap() {
            Lookup::Fetch { generation } => generation,
            other => panic!("expected fetch, got {:?}", other),
        };

        // A change arrives while the fetch is still running.
        store.invalidate(&k);
        store.complete_fetch(&k, "old".to_string(), generation);

        let entry = store.entry(&k).unwrap();
        assert_eq!(entry.data.as_deref(), Some("old"));
        assert_eq!(entry.status(), FetchStatus::Idle);
        assert!(store.is_stale(&k));
    }

    #[test]
    fn test_complete_fetch_without_invalidation_is_fresh() {
        let mut store = store();
        let k = key(&["clients"]);

        store.lookup_or_begin_fetch(&k).unwrap();
        store.complete_fetch(&k, "c".to_string(), 0);

        assert!(!store.is_stale(&k));
        assert_eq!(store.stats().fetches, 1);
    }

    #[test]
    fn test_overlapping_fetches_block_eviction_until_both_finish() {
        let mut store: CacheStore<String> = CacheStore::new(CachePolicy::for_tests());
        let k = key(&["activities"]);

        let slow = match store.lookup_or_begin_fetch(&k).unwrap() {
            Lookup::Fetch { generation } => generation,
            other => panic!("expected fetch, got {:?}", other),
        };
        let fast = match store.lookup_or_begin_fetch(&k).unwrap() {
            Lookup::Fetch { generation } => generation,
            other => panic!("expected fetch, got {:?}", other),
        };
        assert_eq!(store.entry(&k).unwrap().fetching, 2);

        store.complete_fetch(&k, "fast".to_string(), fast);
        assert_eq!(store.entry(&k).unwrap().status(), FetchStatus::Fetching);
        assert_eq!(store.evict_unobserved(), 0);

        store.complete_fetch(&k, "slow".to_string(), slow);
        assert_eq!(store.entry(&k).unwrap().status(), FetchStatus::Idle);
        assert_eq!(store.evict_unobserved(), 1);
    }

    #[test]
    fn test_failed_fetch_leaves_concurrent_fetch_in_flight() {
        let mut store: CacheStore<String> = CacheStore::new(CachePolicy::for_tests());
        let k = key(&["projects"]);

        store.lookup_or_begin_fetch(&k).unwrap();
        store.lookup_or_begin_fetch(&k).unwrap();
        store.record_failure(&k, "timeout");
        store.abort_fetch(&k);

        assert_eq!(store.entry(&k).unwrap().status(), FetchStatus::Fetching);
        store.add_observer(&k).unwrap();
        assert!(!store.remove_observer(&k));
        assert!(store.entry(&k).is_some());
    }

    #[test]
    fn test_record_failure_keeps_data() {
        let mut store = store();
        let k = key(&["invoices"]);
        store.set(k.clone(), "i".to_string()).unwrap();
        store.invalidate(&k);

        store.lookup_or_begin_fetch(&k).unwrap();
        store.record_failure(&k, "503");
        store.abort_fetch(&k);

        let entry = store.entry(&k).unwrap();
        assert_eq!(entry.failure_count, 1);
        assert_eq!(entry.last_error.as_deref(), Some("503"));
        assert_eq!(entry.data.as_deref(), Some("i"));
        assert_eq!(entry.status(), FetchStatus::Idle);
    }

    #[test]
    fn test_observer_removal_with_zero_gc_time() {
        let mut store: CacheStore<String> = CacheStore::new(CachePolicy::for_tests());
        let k = key(&["activities"]);

        store.add_observer(&k).unwrap();
        store.add_observer(&k).unwrap();
        assert!(!store.remove_observer(&k));
        assert!(store.remove_observer(&k));
        assert!(store.entry(&k).is_none());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_observer_removal_keeps_entry_with_gc_window() {
        let mut store = store();
        let k = key(&["activities"]);

        store.add_observer(&k).unwrap();
        assert!(!store.remove_observer(&k));
        assert_eq!(store.entry(&k).unwrap().observers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_unobserved_after_gc_time() {
        let mut store = store();
        store.set(key(&["projects"]), "p".to_string()).unwrap();
        store.add_observer(&key(&["clients"])).unwrap();

        assert_eq!(store.evict_unobserved(), 0);

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(store.evict_unobserved(), 1);
        assert!(store.entry(&key(&["projects"])).is_none());
        assert!(store.entry(&key(&["clients"])).is_some());
    }

    #[test]
    fn test_stale_observed_keys() {
        let mut store = store();
        store.set(key(&["projects"]), "p".to_string()).unwrap();
        store.set(key(&["clients"]), "c".to_string()).unwrap();
        store.add_observer(&key(&["projects"])).unwrap();
        store.add_observer(&key(&["clients"])).unwrap();
        store.add_observer(&key(&["activities"])).unwrap();

        store.invalidate(&key(&["projects"]));

        assert_eq!(
            store.stale_observed_keys(),
            vec![key(&["activities"]), key(&["projects"])]
        );
    }

    #[test]
    fn test_snapshot_sorted() {
        let mut store = store();
        store.set(key(&["projects"]), "p".to_string()).unwrap();
        store.set(key(&["activities"]), "a".to_string()).unwrap();
        store.invalidate(&key(&["projects"]));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].key, key(&["activities"]));
        assert!(!snapshot[0].stale);
        assert!(snapshot[1].stale && snapshot[1].invalidated && snapshot[1].has_data);
    }
}
