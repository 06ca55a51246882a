//! Discount, shipping and order totals.

use crate::promo::{PromoCode, PromoKind};
use crate::types::{LineItem, Money};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Flat shipping fee, waived above a threshold
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingConfig {
    /// Fee charged when shipping is not free
    #[serde(default)]
    pub cost: Money,
    /// Discounted subtotal at which shipping becomes free; zero disables
    #[serde(default)]
    pub threshold: Money,
}

impl ShippingConfig {
    /// Config with negative inputs clamped to zero
    #[must_use]
    pub const fn new(cost: Money, threshold: Money) -> Self {
        Self {
            cost: cost.non_negative(),
            threshold: threshold.non_negative(),
        }
    }
}

/// Shared, admin-editable shipping configuration
#[derive(Debug, Default)]
pub struct ShippingSettings {
    config: RwLock<ShippingConfig>,
}

impl ShippingSettings {
    /// Settings starting from `config`
    #[must_use]
    pub const fn new(config: ShippingConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Current configuration
    #[must_use]
    pub fn get(&self) -> ShippingConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the configuration, returning the stored value
    pub fn update(&self, cost: Money, threshold: Money) -> ShippingConfig {
        let config = ShippingConfig::new(cost, threshold);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        tracing::info!(cost = %config.cost, threshold = %config.threshold, "Shipping settings updated");
        config
    }
}

/// Priced order
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    /// Sum of line totals
    pub subtotal: Money,
    /// Promo discount, never above `subtotal`
    pub discount: Money,
    /// Shipping fee after the free-shipping rule
    pub shipping: Money,
    /// Amount charged
    pub total: Money,
}

/// Sum of line totals
#[must_use]
pub fn subtotal(items: &[LineItem]) -> Money {
    items.iter().map(LineItem::total).sum()
}

/// Discount a promo grants on `subtotal`, clamped to `[0, subtotal]`
///
/// Percentages are rounded to the nearest cent.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_discount(promo: &PromoCode, subtotal: Money) -> Money {
    let ceiling = subtotal.non_negative();
    let raw = match promo.kind {
        PromoKind::Percent => {
            Money::from_decimal(ceiling.cents() as f64 * promo.value / 100.0 / 100.0)
        },
        PromoKind::Fixed => Money::from_decimal(promo.value),
    };
    raw.clamp(Money::ZERO, ceiling)
}

/// Shipping fee for a discounted subtotal
#[must_use]
pub fn shipping_cost(config: &ShippingConfig, amount: Money) -> Money {
    if config.threshold > Money::ZERO && amount >= config.threshold {
        Money::ZERO
    } else {
        config.cost
    }
}

/// Price a cart: subtotal, promo discount, shipping, total
///
/// `total = max(0, subtotal − discount) + shipping`.
#[must_use]
pub fn price_order(
    items: &[LineItem],
    promo: Option<&PromoCode>,
    shipping: &ShippingConfig,
) -> PricingBreakdown {
    let subtotal = subtotal(items);
    let discount = promo.map_or(Money::ZERO, |p| compute_discount(p, subtotal));
    let discounted = (subtotal - discount).non_negative();
    let shipping = shipping_cost(shipping, discounted);

    PricingBreakdown {
        subtotal,
        discount,
        shipping,
        total: discounted + shipping,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn promo(kind: PromoKind, value: f64) -> PromoCode {
        PromoCode {
            code: "TEST".into(),
            kind,
            value,
            active: true,
            min_order_value: Money::ZERO,
            first_order_only: false,
            usage_limit: 0,
            used_count: 0,
        }
    }

    fn burgers(quantity: u32) -> Vec<LineItem> {
        vec![LineItem::new(1, "Classic Burger", Money::from_major(12), quantity)]
    }

    #[test]
    fn ten_percent_off_two_burgers() {
        let breakdown = price_order(
            &burgers(2),
            Some(&promo(PromoKind::Percent, 10.0)),
            &ShippingConfig::default(),
        );

        assert_eq!(breakdown.subtotal, Money::from_major(24));
        assert_eq!(breakdown.discount, Money::from_cents(240));
        assert_eq!(breakdown.shipping, Money::ZERO);
        assert_eq!(breakdown.total, Money::from_cents(2160));
    }

    #[test]
    fn fixed_discount_is_capped_at_subtotal() {
        let breakdown = price_order(
            &burgers(1),
            Some(&promo(PromoKind::Fixed, 50.0)),
            &ShippingConfig::new(Money::from_major(3), Money::ZERO),
        );

        assert_eq!(breakdown.discount, Money::from_major(12));
        assert_eq!(breakdown.total, Money::from_major(3));
    }

    #[test]
    fn free_shipping_uses_discounted_amount() {
        let config = ShippingConfig::new(Money::from_major(40), Money::from_major(24));

        assert_eq!(shipping_cost(&config, Money::from_major(24)), Money::ZERO);
        assert_eq!(shipping_cost(&config, Money::from_cents(2399)), Money::from_major(40));

        // 10% off drops the burgers below the threshold
        let breakdown =
            price_order(&burgers(2), Some(&promo(PromoKind::Percent, 10.0)), &config);
        assert_eq!(breakdown.shipping, Money::from_major(40));
        assert_eq!(breakdown.total, Money::from_cents(6160));
    }

    #[test]
    fn zero_threshold_never_waives_shipping() {
        let config = ShippingConfig::new(Money::from_major(5), Money::ZERO);
        assert_eq!(shipping_cost(&config, Money::from_major(10_000)), Money::from_major(5));
    }

    #[test]
    fn settings_clamp_negative_input() {
        let settings = ShippingSettings::default();
        let stored = settings.update(Money::from_major(-3), Money::from_major(100));
        assert_eq!(stored.cost, Money::ZERO);
        assert_eq!(settings.get().threshold, Money::from_major(100));
    }

    fn any_promo() -> impl Strategy<Value = PromoCode> {
        (
            prop_oneof![Just(PromoKind::Percent), Just(PromoKind::Fixed)],
            prop_oneof![-1_000.0..10_000.0_f64, Just(f64::NAN), Just(f64::INFINITY)],
        )
            .prop_map(|(kind, value)| promo(kind, value))
    }

    proptest! {
        #[test]
        fn discount_stays_within_subtotal(promo in any_promo(), cents in 0_i64..10_000_000) {
            let subtotal = Money::from_cents(cents);
            let discount = compute_discount(&promo, subtotal);
            prop_assert!(discount >= Money::ZERO);
            prop_assert!(discount <= subtotal);
        }

        #[test]
        fn total_is_never_negative(promo in any_promo(), price in 0_i64..100_000, qty in 0_u32..50) {
            let items = vec![LineItem::new(1, "Item", Money::from_cents(price), qty)];
            let breakdown = price_order(&items, Some(&promo), &ShippingConfig::default());
            prop_assert!(breakdown.total >= Money::ZERO);
        }
    }
}
