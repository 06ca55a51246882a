//! Prometheus scrape endpoint.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode};

/// `GET /metrics`
///
/// 404 unless the server was started with `METRICS_ENABLED=true`.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn render(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics.as_ref().and_then(|recorder| recorder.render()) {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
