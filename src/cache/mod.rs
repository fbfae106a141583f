//! Cache Module
//!
//! Client-side query cache with per-key staleness, retrying fetches,
//! prefix invalidation and observer-driven garbage collection.

mod client;
mod entry;
mod key;
mod policy;
mod stats;
mod store;


// Re-export public types
pub use client::{QueryClient, QueryObserver};
pub use entry::{CacheEntry, FetchStatus};
pub use key::CacheKey;
pub use policy::CachePolicy;
pub use stats::CacheStats;
pub use store::{CacheStore, EntrySnapshot, Lookup};

// == Public Constants ==
/// Maximum number of segments in a stored key
pub const MAX_KEY_DEPTH: usize = 16;
