//! API Module
//!
//! Diagnostics HTTP surface over the cache and its realtime subscription.
//!
//! # Endpoints
//! - `GET /health` - Health check, including realtime status
//! - `GET /stats` - Cache statistics
//! - `GET /entries` - Value-free view of every cache entry
//! - `PUT /entries` - Seed an entry as freshly fetched
//! - `POST /invalidate` - Mark a key prefix stale
//! - `POST /focus` - Report keys to refetch after regaining focus
//! - `POST /changes` - Publish a change notification into the feed
//! - `GET /session`, `PUT /session` - Inspect or switch the subscribed identity

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
