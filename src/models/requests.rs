//! Request DTOs for the diagnostics API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::CacheKey;
use crate::realtime::Identity;

/// Request body for seeding a cache entry (PUT /entries)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// Structural key, e.g. `["user-settings", "u1"]`
    pub key: CacheKey,
    /// Value to store as freshly fetched
    pub value: Value,
}

/// Request body for a manual invalidation (POST /invalidate)
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Prefix to mark stale; an empty array marks every entry
    pub key: CacheKey,
}

/// Request body for a login/logout (PUT /session)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionRequest {
    /// Authenticated user, or null to sign out
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl SessionRequest {
    /// The identity this request signs in as, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.user_id.as_ref().map(|id| Identity {
            id: id.clone(),
            email: self.email.clone(),
        })
    }
}
