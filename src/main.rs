//! Durable Cache - HTTP server binary
//!
//! Owns one cache engine for the life of the process:
//! recover from the durable log, serve, then close the log on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use durable_cache::api::{create_router, AppState};
use durable_cache::persistence;
use durable_cache::Config;

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Replay the durable log into a fresh engine
/// 4. Start the background expiration sweeper
/// 5. Serve HTTP until SIGINT/SIGTERM
/// 6. Close the engine, syncing and releasing the log
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "durable_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Durable Cache server");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: max_entries={}, log_path={}, sweep_interval={}ms, default_ttl={:?}, corruption_policy={:?}, port={}",
        config.max_entries,
        config.log_path.display(),
        config.sweep_interval.as_millis(),
        config.default_ttl,
        config.corruption_policy,
        config.server_port
    );

    let (engine, replay) = persistence::load(&config).with_context(|| {
        format!("failed to recover from {}", config.log_path.display())
    })?;
    let engine = Arc::new(engine);
    info!(
        "Recovery complete: {} records replayed, {} corrupt lines skipped",
        replay.records_read, replay.corrupt_skipped
    );

    let sweeper = engine.start_sweeper(config.sweep_interval);

    let app = create_router(AppState::new(engine.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    engine.close().await.context("failed to close durable log")?;
    if let Err(e) = sweeper.await {
        warn!("Sweeper task ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
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
