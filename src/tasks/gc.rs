//! Garbage-Collection Task
//!
//! Background task that periodically evicts unobserved cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::QueryClient;

/// Shortest sweep period; shorter intervals are raised to this.
pub const MIN_GC_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns a background task that sweeps the cache every `interval`.
///
/// Each sweep removes entries with no observers and no fetch in flight whose
/// `gc_time` has elapsed. Entries with active readers are never touched.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let client = QueryClient::new(CachePolicy::default());
/// let gc_handle = spawn_gc_task(client.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// gc_handle.abort();
/// ```
pub fn spawn_gc_task<V>(client: QueryClient<V>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let interval = interval.max(MIN_GC_INTERVAL);
    tokio::spawn(async move {
        info!("Starting cache GC task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let removed = client.evict_unobserved();

            if removed > 0 {
                info!("Cache GC: evicted {} unobserved entries", removed);
            } else {
                debug!("Cache GC: nothing to evict");
            }
        }
    })
}
