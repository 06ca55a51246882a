//! Promo code endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bakery_orders::promo::{self, PromoConditions, PromoContext, PromoKind};
use bakery_orders::{Money, PromoCode, PromoValidation};
use serde::Deserialize;

/// `POST /promos/validate` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    /// Code as typed
    pub code: String,
    /// Cart subtotal
    #[serde(default)]
    pub cart_total: Money,
    /// Customer has never ordered before
    #[serde(default)]
    pub is_first_order: bool,
}

/// `POST /promos` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromoRequest {
    /// New code
    pub code: String,
    /// Discount kind
    #[serde(rename = "type")]
    pub kind: PromoKind,
    /// Percentage or fixed amount
    pub value: f64,
    /// Optional restrictions
    #[serde(flatten)]
    pub conditions: PromoConditions,
}

/// `PATCH /promos/:code` body
#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    /// Enable or disable the code
    pub active: bool,
}

/// `POST /api/v1/promos/validate`
///
/// Always 200; an unusable code is reported in the body.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn validate_promo(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Json<PromoValidation> {
    let context = PromoContext {
        cart_total: request.cart_total,
        is_first_order: request.is_first_order,
    };
    Json(promo::validate_code(
        state.promos.as_ref(),
        &request.code,
        &context,
    ))
}

/// `GET /api/v1/promos`
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn list_promos(State(state): State<AppState>) -> Json<Vec<PromoCode>> {
    Json(state.promos.list_promos())
}

/// `POST /api/v1/promos`
///
/// # Errors
///
/// 422 for an empty code, 409 if the code exists.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn create_promo(
    State(state): State<AppState>,
    Json(request): Json<CreatePromoRequest>,
) -> Result<(StatusCode, Json<PromoCode>), AppError> {
    let created = state.promos.create_promo(
        &request.code,
        request.kind,
        request.value,
        request.conditions,
    )?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PATCH /api/v1/promos/:code`
///
/// # Errors
///
/// 404 if the code does not exist.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn set_active(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<ActiveRequest>,
) -> Result<Json<PromoCode>, AppError> {
    Ok(Json(state.promos.set_active(&code, request.active)?))
}

/// `DELETE /api/v1/promos/:code`
///
/// # Errors
///
/// 404 if the code does not exist.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn delete_promo(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, AppError> {
    state.promos.delete_promo(&code)?;
    Ok(StatusCode::NO_CONTENT)
}
