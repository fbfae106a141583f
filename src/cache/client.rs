//! Query Client Module
//!
//! Process-wide shared handle over the cache store: fetch with retry,
//! observers, invalidation and focus handling.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::cache::{CacheKey, CachePolicy, CacheStats, CacheStore, EntrySnapshot, Lookup};
use crate::error::{CacheError, Result};

// == Query Client ==
/// Cloneable handle to the shared cache store.
///
/// Locks are held only for the duration of one store call, never across an
/// `.await`, so every operation is atomic per key.
#[derive(Debug)]
pub struct QueryClient<V> {
    store: Arc<RwLock<CacheStore<V>>>,
    policy: CachePolicy,
}

impl<V> Clone for QueryClient<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<V: Clone> QueryClient<V> {
    /// Creates a client over an empty store governed by `policy`.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            store: Arc::new(RwLock::new(CacheStore::new(policy))),
            policy,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheStore<V>> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheStore<V>> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Last known value for `key`, fresh or stale.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.write().get(key)
    }

    pub fn set(&self, key: CacheKey, value: V) -> Result<()> {
        self.write().set(key, value)
    }

    // == Invalidate ==
    /// Marks every entry under `prefix` stale. Returns the number marked.
    pub fn invalidate(&self, prefix: &CacheKey) -> usize {
        let marked = self.write().invalidate(prefix);
        debug!("Invalidated {} entr(ies) under {}", marked, prefix);
        marked
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.read().is_stale(key)
    }

    // == Fetch Query ==
    /// Reads `key`, running `fetcher` only if the cached value is not fresh.
    ///
    /// Failed attempts are retried `policy.retry` times with exponential
    /// back-off. On exhaustion the previous data is kept and
    /// [`CacheError::FetchFailed`] is returned.
    pub async fn fetch_query<F, Fut>(&self, key: &CacheKey, mut fetcher: F) -> Result<V>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        let lookup = self.write().lookup_or_begin_fetch(key)?;
        let generation = match lookup {
            Lookup::Fresh(value) => return Ok(value),
            Lookup::Fetch { generation } => generation,
        };

        let mut guard = FetchGuard {
            client: self,
            key,
            armed: true,
        };
        let max_attempts = self.policy.max_attempts();
        let mut attempts = 0;

        loop {
            match fetcher().await {
                Ok(value) => {
                    guard.armed = false;
                    self.write().complete_fetch(key, value.clone(), generation);
                    return Ok(value);
                }
                Err(e) => {
                    attempts += 1;
                    let message = format!("{:#}", e);
                    self.write().record_failure(key, message.clone());

                    if attempts >= max_attempts {
                        warn!(
                            "Fetch for {} failed after {} attempt(s): {}",
                            key, attempts, message
                        );
                        return Err(CacheError::FetchFailed {
                            key: key.to_string(),
                            attempts,
                            message,
                        });
                    }

                    let delay = self.policy.retry_delay(attempts - 1);
                    debug!("Retrying fetch for {} in {:?}", key, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    // == Observe ==
    /// Registers an active reader of `key` for as long as the guard lives.
    pub fn observe(&self, key: CacheKey) -> Result<QueryObserver<V>> {
        self.write().add_observer(&key)?;
        Ok(QueryObserver {
            client: self.clone(),
            key,
        })
    }

    // == Focus ==
    /// Keys the host should refetch after regaining focus.
    ///
    /// Empty unless the policy enables `refetch_on_focus`.
    pub fn on_focus(&self) -> Vec<CacheKey> {
        if !self.policy.refetch_on_focus {
            return Vec::new();
        }
        let keys = self.read().stale_observed_keys();
        debug!("Focus regained: {} stale observed entr(ies)", keys.len());
        keys
    }

    /// Removes entries unobserved for longer than `gc_time`.
    pub fn evict_unobserved(&self) -> usize {
        self.write().evict_unobserved()
    }

    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.read().snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        self.read().stats()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Returns the entry to idle if a fetch gives up or its future is dropped.
struct FetchGuard<'a, V: Clone> {
    client: &'a QueryClient<V>,
    key: &'a CacheKey,
    armed: bool,
}

impl<V: Clone> Drop for FetchGuard<'_, V> {
    fn drop(&mut self) {
        if self.armed {
            self.client.write().abort_fetch(self.key);
        }
    }
}

// == Query Observer ==
/// RAII registration of one active reader.
///
/// While any observer exists the entry is never garbage collected.
#[derive(Debug)]
pub struct QueryObserver<V: Clone> {
    client: QueryClient<V>,
    key: CacheKey,
}

impl<V: Clone> QueryObserver<V> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl<V: Clone> Drop for QueryObserver<V> {
    fn drop(&mut self) {
        self.client.write().remove_observer(&self.key);
    }
}
