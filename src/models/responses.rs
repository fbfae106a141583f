//! Response DTOs for the diagnostics API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheKey, CacheStats};
use crate::realtime::SubscriptionHandle;

/// Response body for PUT /entries
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: CacheKey,
}

impl SetResponse {
    pub fn new(key: CacheKey) -> Self {
        Self {
            message: format!("Key {} set successfully", key),
            key,
        }
    }
}

/// Response body for POST /invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub prefix: CacheKey,
    /// Number of entries marked stale
    pub invalidated: usize,
}

/// Response body for POST /focus
#[derive(Debug, Clone, Serialize)]
pub struct FocusResponse {
    /// Keys the host should refetch
    pub refetch: Vec<CacheKey>,
}

/// Response body for POST /changes
#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    /// Subscriptions the change was delivered to
    pub delivered: usize,
}

/// Response body for GET/PUT /session
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub attached: bool,
    pub handle_id: Option<u64>,
    pub user_id: Option<String>,
    /// Server-side filter of the open subscription
    pub filter: Option<String>,
}

impl SessionResponse {
    pub fn from_handle(handle: Option<&SubscriptionHandle>) -> Self {
        match handle {
            Some(handle) => Self {
                attached: true,
                handle_id: Some(handle.id()),
                user_id: Some(handle.identity().id.clone()),
                filter: Some(handle.filter().to_string()),
            },
            None => Self {
                attached: false,
                handle_id: None,
                user_id: None,
                filter: None,
            },
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Whether a realtime subscription is open
    pub realtime: bool,
}

impl HealthResponse {
    pub fn healthy(realtime: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            realtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_response_flattens() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();

        let json = serde_json::to_value(StatsResponse::from(stats)).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["misses"], 1);
        assert_eq!(json["hit_rate"], 0.5);
    }

    #[test]
    fn test_detached_session_response() {
        let response = SessionResponse::from_handle(None);
        assert!(!response.attached);
        assert!(response.filter.is_none());
    }

    #[test]
    fn test_health_response() {
        let response = HealthResponse::healthy(false);
        assert_eq!(response.status, "healthy");
        assert!(!response.timestamp.is_empty());
    }
}
