//! Realtime Cache - keeps a client-side query cache coherent with a remote
//! change-data stream.
//!
//! Subscriptions are scoped per authenticated identity; every change routed
//! to a table marks the matching cache key prefixes stale so the next read
//! refetches.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheKey, CachePolicy, QueryClient};
pub use config::Config;
pub use error::{CacheError, Result};
pub use realtime::{InvalidationRouter, InvalidationRules, SubscriptionManager};
pub use tasks::spawn_gc_task;
