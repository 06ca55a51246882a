//! Burger & Bakery sync server.
//!
//! Serves the WebSocket sync channel and the REST API over one in-memory
//! order store.

use bakery_sync_runtime::metrics::MetricsRecorder;
use bakery_sync_web::{AppState, Config};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Burger & Bakery sync server");

    let config = Config::from_env();
    info!(
        address = %config.bind_address(),
        durable_hide = config.store.durable_hide,
        strict_transitions = config.store.strict_transitions,
        self_echo = ?config.sync.self_echo,
        "Configuration loaded"
    );

    let metrics_enabled = config.server.metrics_enabled;
    let addr = config.bind_address();
    let mut state = AppState::new(config);

    if metrics_enabled {
        let mut recorder = MetricsRecorder::new();
        match recorder.install() {
            Ok(()) => state = state.with_metrics(recorder),
            Err(error) => warn!(%error, "Metrics disabled"),
        }
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    bakery_sync_web::serve(listener, state, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

/// Graceful shutdown signal handler.
///
/// Waits for:
/// - Ctrl+C (SIGINT)
/// - SIGTERM (in production environments)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(error) => {
                warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
