//! medley-server: HTTP API and background list sync.
//!
//! This crate ties the other medley crates into a running server:
//!
//! - Axum HTTP API over the catalog, per-user data, clients and lists
//! - Request ids, authentication and rate limiting as middleware
//! - A scheduler that periodically syncs lists flagged `auto_sync`
//! - Graceful shutdown via signal handling

pub mod catalog;
pub mod context;
pub mod envelope;
pub mod error;
pub mod lists;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod scheduler;

use std::net::SocketAddr;
use std::path::PathBuf;

use medley_core::config::Config;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Open (or create) the database named in `config`.
pub fn open_database(config: &Config) -> medley_core::Result<medley_db::pool::DbPool> {
    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    let db = medley_db::pool::init_pool(db_path)?;
    if existed {
        tracing::info!("Database opened (existing) at {}", db_path.display());
    } else {
        tracing::info!("Database created (new) at {}", db_path.display());
    }
    Ok(db)
}

/// Start the medley server.
///
/// Initializes the database, builds the [`AppContext`], spawns the sync
/// scheduler and serves HTTP until a shutdown signal arrives.
pub async fn start(config: Config, config_path: Option<PathBuf>) -> medley_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }
    match &config_path {
        Some(path) => tracing::info!("Using config file {}", path.display()),
        None => tracing::info!("No config file found, using defaults"),
    }

    let db = open_database(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| medley_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let mut ctx = AppContext::new(db, config);
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => ctx = ctx.with_metrics(handle),
        Err(e) => tracing::warn!("Metrics recorder not installed: {e}"),
    }

    let cancel = CancellationToken::new();

    let scheduler_ctx = ctx.clone();
    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler::run_scheduler(scheduler_ctx, scheduler_cancel).await;
    });

    let app = router::build_router(ctx);

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| medley_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Signal background tasks to stop.
    cancel.cancel();
    let _ = scheduler_handle.await;

    served.map_err(|e| medley_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        _ = cancel.cancelled() => {}
    }
}
