//! Realtime Cache - host process
//!
//! Runs the query cache, its realtime subscription and a diagnostics server.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use realtime_cache::api::create_router;
use realtime_cache::realtime::{Identity, StaticIdentityProvider};
use realtime_cache::{spawn_gc_task, AppState, Config};

/// Main entry point for the realtime cache host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the query cache, change feed and subscription manager
/// 4. Attach the realtime subscription for the configured identity, if any
/// 5. Start the background GC task
/// 6. Serve the diagnostics API until SIGINT/SIGTERM
/// 7. Detach the subscription and stop the GC task
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realtime_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting realtime cache host");

    let config = Config::from_env();
    info!(
        "Configuration loaded: stale_time={}ms, retry={}, refetch_on_focus={}, gc_time={}ms, port={}",
        config.stale_time_ms,
        config.retry,
        config.refetch_on_focus,
        config.gc_time_ms,
        config.server_port
    );

    let state = AppState::from_config(&config);

    let provider = StaticIdentityProvider::new(config.user_id.clone().map(Identity::new));
    match state
        .subscriptions
        .lock()
        .await
        .attach_current(&provider)
        .await
    {
        Some(handle_id) => info!("Realtime subscription {} attached", handle_id),
        None => info!("No realtime subscription; cache will refresh on staleness only"),
    }

    let gc_handle = spawn_gc_task(state.cache.clone(), config.gc_interval());
    info!("Background GC task started");

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Diagnostics listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.subscriptions.lock().await.detach().await;
    gc_handle.abort();
    warn!("GC task aborted");

    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
