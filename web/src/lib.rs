//! Axum server for Burger & Bakery order synchronization.
//!
//! The server owns the authoritative order store and exposes it two ways:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Imperative Shell (Axum)         │  ← WebSocket sync channel
//! │  - /ws: snapshot + incremental events   │  ← REST checkout and admin API
//! │  - /api/v1: request/response            │  ← CORS, tracing, metrics
//! ├─────────────────────────────────────────┤
//! │         Functional Core                 │
//! │  - OrderStoreReducer                    │  ← one action at a time
//! │  - Broadcasts in store order            │  ← same order for every client
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use bakery_sync_web::{build_router, AppState, Config};
//!
//! let state = AppState::new(Config::from_env());
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await?;
//! bakery_sync_web::serve(listener, state, shutdown_signal()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{Config, SelfEcho};
pub use error::AppError;
pub use routes::build_router;
pub use state::{AppState, OrderStore};

use std::future::Future;
use tokio::net::TcpListener;


/// Serve until `shutdown` resolves, then drain the order store
///
/// # Errors
///
/// Returns the listener's I/O error if serving fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = std::sync::Arc::clone(&state.store);
    let drain_timeout = state.config.shutdown_timeout();

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Err(error) = store.shutdown(drain_timeout).await {
        tracing::warn!(%error, "Order store did not drain cleanly");
    }
    Ok(())
}
