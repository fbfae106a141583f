//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the host is up.
//!
//! # Tasks
//! - GC sweep: Evicts cache entries that have gone unobserved for `gc_time`

mod gc;

pub use gc::{spawn_gc_task, MIN_GC_INTERVAL};
