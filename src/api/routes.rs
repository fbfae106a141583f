//! API Routes
//!
//! Configures the Axum router with all diagnostics endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    changes_handler, entries_handler, focus_handler, health_handler, invalidate_handler,
    session_handler, set_handler, stats_handler, update_session_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/entries", get(entries_handler).put(set_handler))
        .route("/invalidate", post(invalidate_handler))
        .route("/focus", post(focus_handler))
        .route("/changes", post(changes_handler))
        .route("/session", get(session_handler).put(update_session_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
