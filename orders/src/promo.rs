//! Promo codes: validation against an order context and the promo catalog.
//!
//! Validation never fails with an error. A rejected code is a
//! [`PromoValidation`] with `valid == false` and a message the storefront
//! shows as-is.

use crate::types::Money;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Shown when the code is unknown or inactive
pub const MSG_NOT_FOUND: &str = "Promo code not found";
/// Shown when the customer has ordered before
pub const MSG_FIRST_ORDER_ONLY: &str = "This code is valid for first-time orders only";
/// Shown when `usedCount` reached `usageLimit`
pub const MSG_USAGE_LIMIT: &str = "This promo code has reached its usage limit";
/// Shown on success
pub const MSG_APPLIED: &str = "Promo code applied!";

/// How the discount is computed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromoKind {
    /// `value` percent of the subtotal
    Percent,
    /// `value` off, in major units
    Fixed,
}

/// A promo code as configured by the admin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    /// Trimmed, upper-cased code
    pub code: String,
    /// Discount kind
    #[serde(rename = "type")]
    pub kind: PromoKind,
    /// Percentage or fixed amount, depending on `kind`
    pub value: f64,
    /// Inactive codes validate as not found
    pub active: bool,
    /// Minimum cart total; zero disables the check
    #[serde(default)]
    pub min_order_value: Money,
    /// Only customers without a previous order may redeem
    #[serde(default)]
    pub first_order_only: bool,
    /// Maximum redemptions; zero means unlimited
    #[serde(default)]
    pub usage_limit: u32,
    /// Redemptions so far
    #[serde(default)]
    pub used_count: u32,
}

impl PromoCode {
    /// Usage limit reached
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.usage_limit > 0 && self.used_count >= self.usage_limit
    }
}

/// Optional restrictions supplied when creating a code
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoConditions {
    /// See [`PromoCode::min_order_value`]
    #[serde(default)]
    pub min_order_value: Money,
    /// See [`PromoCode::first_order_only`]
    #[serde(default)]
    pub first_order_only: bool,
    /// See [`PromoCode::usage_limit`]
    #[serde(default)]
    pub usage_limit: u32,
}

/// What a code is validated against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoContext {
    /// Cart subtotal before discount
    #[serde(default)]
    pub cart_total: Money,
    /// The customer has never placed an order
    #[serde(default)]
    pub is_first_order: bool,
}

/// Result of validating a code
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromoValidation {
    /// Whether the code can be applied
    pub valid: bool,
    /// User-facing message
    pub message: String,
    /// The matched promo, on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo: Option<PromoCode>,
}

impl PromoValidation {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            promo: None,
        }
    }
}

/// Trim and upper-case a user-entered code
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Check a looked-up promo against the order context
///
/// Checks run in a fixed order and the first failure wins: existence and
/// activity, minimum order value, first-order restriction, usage limit.
#[must_use]
pub fn validate(promo: Option<&PromoCode>, context: &PromoContext) -> PromoValidation {
    let Some(promo) = promo.filter(|p| p.active) else {
        return PromoValidation::rejected(MSG_NOT_FOUND);
    };

    if promo.min_order_value > Money::ZERO && context.cart_total < promo.min_order_value {
        return PromoValidation::rejected(format!(
            "Minimum order value of ₹{} required",
            promo.min_order_value.compact()
        ));
    }

    if promo.first_order_only && !context.is_first_order {
        return PromoValidation::rejected(MSG_FIRST_ORDER_ONLY);
    }

    if promo.is_exhausted() {
        return PromoValidation::rejected(MSG_USAGE_LIMIT);
    }

    PromoValidation {
        valid: true,
        message: MSG_APPLIED.to_string(),
        promo: Some(promo.clone()),
    }
}

/// Look a code up in the catalog and validate it
#[must_use]
pub fn validate_code(
    catalog: &dyn PromoCatalog,
    code: &str,
    context: &PromoContext,
) -> PromoValidation {
    let promo = catalog.get_promo(code);
    validate(promo.as_ref(), context)
}

/// Errors from promo catalog administration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromoError {
    /// Code is empty after trimming
    #[error("Promo code must not be empty")]
    Empty,

    /// Code already exists (active or not)
    #[error("Code {0} already exists")]
    Duplicate(String),

    /// No such code
    #[error("Promo code {0} not found")]
    NotFound(String),

    /// Redemptions already reached `usage_limit`
    #[error("Promo code {0} has reached its usage limit")]
    Exhausted(String),
}

/// Promo configuration store
///
/// All lookups normalize the code first.
pub trait PromoCatalog: Send + Sync {
    /// Find a code regardless of whether it is active
    fn get_promo(&self, code: &str) -> Option<PromoCode>;

    /// Record one redemption
    ///
    /// # Errors
    ///
    /// [`PromoError::NotFound`] if the code does not exist,
    /// [`PromoError::Exhausted`] if it has no redemptions left.
    fn increment_usage(&self, code: &str) -> Result<(), PromoError>;

    /// Create an active code with zero redemptions
    ///
    /// # Errors
    ///
    /// [`PromoError::Empty`] or [`PromoError::Duplicate`].
    fn create_promo(
        &self,
        code: &str,
        kind: PromoKind,
        value: f64,
        conditions: PromoConditions,
    ) -> Result<PromoCode, PromoError>;

    /// Remove a code
    ///
    /// # Errors
    ///
    /// [`PromoError::NotFound`] if the code does not exist.
    fn delete_promo(&self, code: &str) -> Result<(), PromoError>;

    /// All codes in creation order
    fn list_promos(&self) -> Vec<PromoCode>;

    /// Enable or disable a code
    ///
    /// # Errors
    ///
    /// [`PromoError::NotFound`] if the code does not exist.
    fn set_active(&self, code: &str, active: bool) -> Result<PromoCode, PromoError>;
}

/// Process-local promo catalog
#[derive(Debug, Default)]
pub struct InMemoryPromoCatalog {
    promos: RwLock<Vec<PromoCode>>,
}

impl InMemoryPromoCatalog {
    /// Empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with `promos` (codes are normalized)
    #[must_use]
    pub fn with_promos(promos: impl IntoIterator<Item = PromoCode>) -> Self {
        let promos = promos
            .into_iter()
            .map(|mut p| {
                p.code = normalize_code(&p.code);
                p
            })
            .collect();
        Self {
            promos: RwLock::new(promos),
        }
    }

    fn update<T>(
        &self,
        code: &str,
        f: impl FnOnce(&mut PromoCode) -> T,
    ) -> Result<T, PromoError> {
        let code = normalize_code(code);
        let mut promos = self
            .promos
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        promos
            .iter_mut()
            .find(|p| p.code == code)
            .map(f)
            .ok_or(PromoError::NotFound(code))
    }
}

impl PromoCatalog for InMemoryPromoCatalog {
    fn get_promo(&self, code: &str) -> Option<PromoCode> {
        let code = normalize_code(code);
        self.promos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.code == code)
            .cloned()
    }

    fn increment_usage(&self, code: &str) -> Result<(), PromoError> {
        self.update(code, |p| {
            if p.is_exhausted() {
                return Err(PromoError::Exhausted(p.code.clone()));
            }
            p.used_count = p.used_count.saturating_add(1);
            tracing::debug!(code = %p.code, used = p.used_count, "Promo redeemed");
            Ok(())
        })?
    }

    fn create_promo(
        &self,
        code: &str,
        kind: PromoKind,
        value: f64,
        conditions: PromoConditions,
    ) -> Result<PromoCode, PromoError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(PromoError::Empty);
        }

        let mut promos = self
            .promos
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if promos.iter().any(|p| p.code == code) {
            return Err(PromoError::Duplicate(code));
        }

        let promo = PromoCode {
            code,
            kind,
            value: if value.is_finite() { value } else { 0.0 },
            active: true,
            min_order_value: conditions.min_order_value.non_negative(),
            first_order_only: conditions.first_order_only,
            usage_limit: conditions.usage_limit,
            used_count: 0,
        };
        promos.push(promo.clone());
        tracing::info!(code = %promo.code, "Promo code created");
        Ok(promo)
    }

    fn delete_promo(&self, code: &str) -> Result<(), PromoError> {
        let code = normalize_code(code);
        let mut promos = self
            .promos
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = promos.len();
        promos.retain(|p| p.code != code);
        if promos.len() == before {
            return Err(PromoError::NotFound(code));
        }
        tracing::info!(%code, "Promo code deleted");
        Ok(())
    }

    fn list_promos(&self) -> Vec<PromoCode> {
        self.promos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_active(&self, code: &str, active: bool) -> Result<PromoCode, PromoError> {
        self.update(code, |p| {
            p.active = active;
            p.clone()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn catalog() -> InMemoryPromoCatalog {
        let catalog = InMemoryPromoCatalog::new();
        catalog
            .create_promo("save10", PromoKind::Percent, 10.0, PromoConditions::default())
            .unwrap();
        catalog
            .create_promo(
                "FIRST50",
                PromoKind::Percent,
                50.0,
                PromoConditions {
                    first_order_only: true,
                    ..PromoConditions::default()
                },
            )
            .unwrap();
        catalog
            .create_promo(
                "BIG",
                PromoKind::Fixed,
                100.0,
                PromoConditions {
                    min_order_value: Money::from_major(500),
                    usage_limit: 1,
                    ..PromoConditions::default()
                },
            )
            .unwrap();
        catalog
    }

    fn ctx(cart_total: i64, is_first_order: bool) -> PromoContext {
        PromoContext {
            cart_total: Money::from_major(cart_total),
            is_first_order,
        }
    }

    #[test]
    fn applies_valid_code_case_insensitively() {
        let result = validate_code(&catalog(), "  Save10 ", &ctx(24, false));
        assert!(result.valid);
        assert_eq!(result.message, "Promo code applied!");
        assert_eq!(result.promo.unwrap().code, "SAVE10");
    }

    #[test]
    fn unknown_code() {
        let result = validate_code(&catalog(), "NOPE", &ctx(24, true));
        assert!(!result.valid);
        assert_eq!(result.message, "Promo code not found");
        assert!(result.promo.is_none());
    }

    #[test]
    fn inactive_code_is_not_found() {
        let catalog = catalog();
        catalog.set_active("save10", false).unwrap();
        let result = validate_code(&catalog, "SAVE10", &ctx(24, true));
        assert_eq!(result.message, "Promo code not found");
    }

    #[test]
    fn first_order_only_rejects_returning_customer() {
        let result = validate_code(&catalog(), "FIRST50", &ctx(24, false));
        assert!(!result.valid);
        assert_eq!(result.message, "This code is valid for first-time orders only");

        assert!(validate_code(&catalog(), "FIRST50", &ctx(24, true)).valid);
    }

    #[test]
    fn minimum_order_value() {
        let result = validate_code(&catalog(), "BIG", &ctx(499, true));
        assert_eq!(result.message, "Minimum order value of ₹500 required");
        assert!(validate_code(&catalog(), "BIG", &ctx(500, true)).valid);
    }

    #[test]
    fn usage_limit() {
        let catalog = catalog();
        catalog.increment_usage("big").unwrap();
        let result = validate_code(&catalog, "BIG", &ctx(600, true));
        assert_eq!(result.message, "This promo code has reached its usage limit");
    }

    #[test]
    fn increment_stops_at_usage_limit() {
        let catalog = catalog();
        catalog.increment_usage("BIG").unwrap();
        assert_eq!(
            catalog.increment_usage("big"),
            Err(PromoError::Exhausted("BIG".into()))
        );
        assert_eq!(catalog.get_promo("BIG").unwrap().used_count, 1);

        // Unlimited codes keep counting
        for _ in 0..3 {
            catalog.increment_usage("SAVE10").unwrap();
        }
        assert_eq!(catalog.get_promo("SAVE10").unwrap().used_count, 3);
    }

    #[test]
    fn minimum_is_checked_before_usage_limit() {
        let catalog = catalog();
        catalog.increment_usage("BIG").unwrap();
        let result = validate_code(&catalog, "BIG", &ctx(10, false));
        assert_eq!(result.message, "Minimum order value of ₹500 required");
    }

    #[test]
    fn create_rejects_empty_and_duplicate_codes() {
        let catalog = catalog();
        assert_eq!(
            catalog.create_promo("   ", PromoKind::Fixed, 5.0, PromoConditions::default()),
            Err(PromoError::Empty)
        );
        assert_eq!(
            catalog.create_promo("first50 ", PromoKind::Fixed, 5.0, PromoConditions::default()),
            Err(PromoError::Duplicate("FIRST50".into()))
        );
    }

    #[test]
    fn delete_and_list() {
        let catalog = catalog();
        assert_eq!(catalog.list_promos().len(), 3);
        catalog.delete_promo("save10").unwrap();
        assert_eq!(
            catalog.delete_promo("SAVE10"),
            Err(PromoError::NotFound("SAVE10".into()))
        );
        let codes: Vec<_> = catalog.list_promos().into_iter().map(|p| p.code).collect();
        assert_eq!(codes, vec!["FIRST50", "BIG"]);
    }

    #[test]
    fn promo_wire_shape() {
        let promo = catalog().get_promo("BIG").unwrap();
        let wire = serde_json::to_value(&promo).unwrap();
        assert_eq!(wire["type"], "fixed");
        assert_eq!(wire["minOrderValue"], 500.0);
        assert_eq!(wire["usageLimit"], 1);
        assert_eq!(wire["usedCount"], 0);
    }
}
