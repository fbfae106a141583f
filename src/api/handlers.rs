//! API Handlers
//!
//! HTTP request handlers for each diagnostics endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::cache::{EntrySnapshot, QueryClient};
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    FocusResponse, HealthResponse, InvalidateRequest, InvalidateResponse, PublishResponse,
    SessionRequest, SessionResponse, SetRequest, SetResponse, StatsResponse,
};
use crate::realtime::{
    ChangeNotification, ChangeStreamClient, InvalidationRouter, MemoryChangeFeed,
    SubscriptionManager,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide query cache
    pub cache: QueryClient<Value>,
    /// Change feed standing in for the remote service
    pub feed: Arc<MemoryChangeFeed>,
    /// Subscription owner for the host's session
    pub subscriptions: Arc<Mutex<SubscriptionManager>>,
}

impl AppState {
    pub fn new(
        cache: QueryClient<Value>,
        feed: Arc<MemoryChangeFeed>,
        subscriptions: SubscriptionManager,
    ) -> Self {
        Self {
            cache,
            feed,
            subscriptions: Arc::new(Mutex::new(subscriptions)),
        }
    }

    /// Wires cache, feed, router and subscription manager from configuration.
    pub fn from_config(config: &Config) -> Self {
        let cache = QueryClient::new(config.cache_policy());
        let feed = Arc::new(MemoryChangeFeed::new());
        let client = Arc::new(ChangeStreamClient::new(
            feed.clone(),
            config.owner_column.clone(),
        ));
        let router = Arc::new(InvalidationRouter::new(
            config.invalidation_rules.clone(),
            cache.clone(),
        ));
        let subscriptions = SubscriptionManager::new("dashboard", client, router);
        Self::new(cache, feed, subscriptions)
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let realtime = state.subscriptions.lock().await.is_attached();
    Json(HealthResponse::healthy(realtime))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.cache.stats().into())
}

/// Handler for GET /entries
pub async fn entries_handler(State(state): State<AppState>) -> Json<Vec<EntrySnapshot>> {
    Json(state.cache.snapshot())
}

/// Handler for PUT /entries
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    state.cache.set(req.key.clone(), req.value)?;
    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Json<InvalidateResponse> {
    let invalidated = state.cache.invalidate(&req.key);
    Json(InvalidateResponse {
        prefix: req.key,
        invalidated,
    })
}

/// Handler for POST /focus
pub async fn focus_handler(State(state): State<AppState>) -> Json<FocusResponse> {
    Json(FocusResponse {
        refetch: state.cache.on_focus(),
    })
}

/// Handler for POST /changes
///
/// Publishes into the feed; the scope filters decide who receives it.
pub async fn changes_handler(
    State(state): State<AppState>,
    Json(notification): Json<ChangeNotification>,
) -> Json<PublishResponse> {
    let delivered = state.feed.publish(notification);
    Json(PublishResponse { delivered })
}

/// Handler for GET /session
pub async fn session_handler(State(state): State<AppState>) -> Json<SessionResponse> {
    let subscriptions = state.subscriptions.lock().await;
    Json(SessionResponse::from_handle(subscriptions.active()))
}

/// Handler for PUT /session
///
/// Signing in attaches for the new identity; `{"user_id": null}` signs out.
pub async fn update_session_handler(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Json<SessionResponse> {
    let mut subscriptions = state.subscriptions.lock().await;
    subscriptions.attach(req.identity().as_ref()).await;
    Json(SessionResponse::from_handle(subscriptions.active()))
}
