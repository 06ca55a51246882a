//! Router configuration for the sync server.
//!
//! Builds the complete Axum router with all endpoints.

use crate::handlers::{health, metrics, orders, promos, shipping, sync};
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete Axum router.
///
/// - `GET /ws`: sync channel
/// - `/api/v1/...`: orders, promos, shipping and dashboard stats
/// - `GET /health`, `GET /health/ready`, `GET /metrics`
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/orders", get(orders::list_orders).post(orders::place_order))
        .route(
            "/orders/:id",
            get(orders::get_order).delete(orders::delete_order),
        )
        .route("/orders/:id/status", patch(orders::update_status))
        .route("/stats", get(orders::stats))
        .route(
            "/promos",
            get(promos::list_promos).post(promos::create_promo),
        )
        .route("/promos/validate", post(promos::validate_promo))
        .route(
            "/promos/:code",
            patch(promos::set_active).delete(promos::delete_promo),
        )
        .route(
            "/shipping",
            get(shipping::get_shipping).put(shipping::update_shipping),
        );

    Router::new()
        .route("/ws", get(sync::handle))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/metrics", get(metrics::render))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
