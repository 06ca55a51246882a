//! Order endpoints.
//!
//! Reads go straight to the store state. Writes are sent to the store with a
//! fresh [`ConnectionId`] and answered from the broadcast the store produces
//! for them, so REST clients see exactly what sync connections see.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bakery_orders::store::OrderStats;
use bakery_orders::{
    ConnectionId, Order, OrderAction, OrderDraft, OrderId, OrderStatus, OrderStoreState,
    StatusUpdate,
};
use bakery_sync_runtime::error::StoreError;
use serde::Deserialize;

/// `PATCH /orders/:id/status` body
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Requested status
    pub status: OrderStatus,
}

/// Send `action` and wait for the store's answer to it
async fn dispatch(state: &AppState, action: OrderAction) -> Result<OrderAction, AppError> {
    let origin = action.origin();
    let reply = state
        .store
        .send_and_wait_for(
            action,
            |a| a.origin() == origin && a.is_event(),
            state.config.checkout_timeout(),
        )
        .await?;

    match reply {
        OrderAction::MutationRejected { error, .. } => Err(error.into()),
        accepted => Ok(accepted),
    }
}

fn unexpected(reply: &OrderAction) -> AppError {
    AppError::internal("Unexpected store reply")
        .with_source(anyhow::anyhow!("unexpected store reply: {reply:?}"))
}

/// `GET /api/v1/orders`, newest first
pub async fn list_orders(State(state): State<AppState>) -> Json<Vec<Order>> {
    Json(state.store.state(OrderStoreState::orders_newest_first).await)
}

/// `GET /api/v1/orders/:id`
///
/// # Errors
///
/// 404 if the order does not exist.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    let id = OrderId::new(id);
    state
        .store
        .state(|s| s.get(id).cloned())
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("Order", id))
}

/// `POST /api/v1/orders`: checkout
///
/// # Errors
///
/// - 422 for missing shipping details or an invalid promo code
/// - 408 if the store does not answer within the checkout timeout
pub async fn place_order(
    State(state): State<AppState>,
    Json(draft): Json<OrderDraft>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let origin = ConnectionId::next();
    tracing::info!(%origin, items = draft.items.len(), "Checkout requested");

    match dispatch(&state, OrderAction::PlaceOrder { origin, draft }).await? {
        OrderAction::OrderAdded { order, .. } => Ok((StatusCode::CREATED, Json(order))),
        other => Err(unexpected(&other)),
    }
}

/// `PATCH /api/v1/orders/:id/status`
///
/// # Errors
///
/// 404 for an unknown order, 409 if a strict store refuses the transition.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<StatusUpdate>, AppError> {
    let action = OrderAction::UpdateStatus {
        origin: ConnectionId::next(),
        order_id: OrderId::new(id),
        status: request.status,
    };

    match dispatch(&state, action).await? {
        OrderAction::OrderUpdated {
            order_id, status, ..
        } => Ok(Json(StatusUpdate { order_id, status })),
        other => Err(unexpected(&other)),
    }
}

/// `DELETE /api/v1/orders/:id`, idempotent
///
/// # Errors
///
/// 409 if a strict store refuses to delete an order in progress.
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    let order_id = OrderId::new(id);
    if !state.store.state(|s| s.contains(order_id)).await {
        return Ok(StatusCode::NO_CONTENT);
    }

    let action = OrderAction::DeleteOrder {
        origin: ConnectionId::next(),
        order_id,
    };
    match dispatch(&state, action).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        // Someone else deleted it first; the store stays silent then
        Err(e) if e.status() == StatusCode::REQUEST_TIMEOUT => {
            if state.store.state(|s| s.contains(order_id)).await {
                Err(StoreError::Timeout.into())
            } else {
                Ok(StatusCode::NO_CONTENT)
            }
        },
        Err(e) => Err(e),
    }
}

/// `GET /api/v1/stats`: admin dashboard figures
pub async fn stats(State(state): State<AppState>) -> Json<OrderStats> {
    Json(state.store.state(OrderStoreState::stats).await)
}
