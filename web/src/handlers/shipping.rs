//! Shipping settings endpoints.

use crate::state::AppState;
use axum::{extract::State, Json};
use bakery_orders::{Money, ShippingConfig};
use serde::Deserialize;

/// `PUT /shipping` body; negative amounts are stored as zero
#[derive(Debug, Deserialize)]
pub struct ShippingRequest {
    /// Flat fee
    pub cost: Money,
    /// Free-shipping threshold, zero disables
    pub threshold: Money,
}

/// `GET /api/v1/shipping`
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn get_shipping(State(state): State<AppState>) -> Json<ShippingConfig> {
    Json(state.shipping.get())
}

/// `PUT /api/v1/shipping`
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn update_shipping(
    State(state): State<AppState>,
    Json(request): Json<ShippingRequest>,
) -> Json<ShippingConfig> {
    Json(state.shipping.update(request.cost, request.threshold))
}
