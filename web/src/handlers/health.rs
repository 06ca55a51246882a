//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::state::OrderStore;
use axum::{extract::State, http::StatusCode, Json};
use bakery_sync_runtime::{HealthCheck, HealthStatus};
use std::sync::Arc;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Health check with order store diagnostics (for readiness).
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy (the store is shutting down)
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
///
/// # Response
///
/// ```json
/// {
///   "component": "store",
///   "status": "Healthy",
///   "message": null,
///   "metadata": [["subscribers", "4"], ["orders", "12"], ["active_orders", "3"]]
/// }
/// ```
pub async fn readiness_check(
    State(store): State<Arc<OrderStore>>,
) -> (StatusCode, Json<HealthCheck>) {
    let (orders, active) = store.state(|s| (s.len(), s.active_count())).await;
    let health = store
        .health()
        .with_metadata("orders", orders.to_string())
        .with_metadata("active_orders", active.to_string());

    let status = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(health))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::AppState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_readiness_with_healthy_store() {
        let state = AppState::new(Config::default());

        let (status, Json(health)) = readiness_check(State(Arc::clone(&state.store))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health
            .metadata
            .iter()
            .any(|(key, value)| key == "orders" && value == "0"));
    }

    #[tokio::test]
    async fn test_readiness_after_shutdown() {
        let state = AppState::new(Config::default());
        state.store.shutdown(Duration::from_millis(100)).await.unwrap();

        let (status, _) = readiness_check(State(Arc::clone(&state.store))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
