//! Core domain types for orders.
//!
//! Orders progress through: Preparing → Baked → `OutForDelivery` → Delivered,
//! with Cancelled reachable from any non-terminal status.
//!
//! All types serialize to the storefront's wire shape: camelCase field names,
//! snake-case status strings, and money as a JSON number in major units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

/// Unique identifier for an order
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(u64);

impl OrderId {
    /// Creates a new `OrderId`
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the inner numeric value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Money amount in cents (to avoid floating point issues)
///
/// Serialized as a number in major units (`2160` cents ⇄ `21.6`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Money(i64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a new money amount from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new money amount from whole major units
    #[must_use]
    pub const fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    /// Converts a decimal amount in major units, rounding to the nearest cent
    ///
    /// Non-finite input becomes zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // saturating float-to-int cast is intended
    pub fn from_decimal(amount: f64) -> Self {
        if amount.is_finite() {
            Self((amount * 100.0).round() as i64)
        } else {
            Self::ZERO
        }
    }

    /// Returns the value in cents
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value in major units (as floating point)
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // i64 to f64 precision loss is acceptable for display
    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Multiplies by a quantity, saturating on overflow
    #[must_use]
    pub const fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as i64))
    }

    /// Larger of `self` and zero
    #[must_use]
    pub const fn non_negative(self) -> Self {
        if self.0 < 0 { Self::ZERO } else { self }
    }

    /// Shortest human form without currency sign: `200`, `199.5`, `0.05`
    #[must_use]
    pub fn compact(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let (units, cents) = (abs / 100, abs % 100);
        match cents {
            0 => format!("{sign}{units}"),
            c if c % 10 == 0 => format!("{sign}{units}.{}", c / 10),
            c => format!("{sign}{units}.{c:02}"),
        }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{:.2}", self.as_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Self::from_decimal)
    }
}

/// Status of an order in its lifecycle
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order accepted, kitchen is preparing it
    Preparing,
    /// Baked and waiting for a rider
    Baked,
    /// On the way to the customer
    OutForDelivery,
    /// Handed over (terminal)
    Delivered,
    /// Cancelled (terminal)
    Cancelled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [Self; 5] = [
        Self::Preparing,
        Self::Baked,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// `delivered` and `cancelled` are end states
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Transition table used by strict stores
    ///
    /// Forward moves along the happy path, direct jumps to a terminal status
    /// from any non-terminal one, and re-asserting the current status are
    /// allowed. Nothing leaves a terminal status.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Preparing, Self::Preparing | Self::Baked)
            | (Self::Baked, Self::Baked | Self::OutForDelivery)
            | (Self::OutForDelivery, Self::OutForDelivery)
            | (Self::Preparing | Self::Baked | Self::OutForDelivery, Self::Delivered | Self::Cancelled)
            | (Self::Delivered, Self::Delivered)
            | (Self::Cancelled, Self::Cancelled) => true,
            _ => false,
        }
    }

    /// Wire name (`out_for_delivery`)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Baked => "baked",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line item, copied from the cart at checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product identifier
    pub id: u64,
    /// Product name for display
    pub name: String,
    /// Price per unit
    pub price: Money,
    /// Quantity ordered
    pub quantity: u32,
    /// Display color of the product card
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Product category (`burger`, `bakery`, `cake`, ...)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl LineItem {
    /// Creates a new line item
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>, price: Money, quantity: u32) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            quantity,
            color: None,
            kind: None,
        }
    }

    /// Calculates the total price for this line item
    #[must_use]
    pub const fn total(&self) -> Money {
        self.price.times(self.quantity)
    }
}

/// Where the order is delivered
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    /// Recipient name
    #[serde(default)]
    pub name: String,
    /// Contact email (optional at checkout)
    #[serde(default)]
    pub email: String,
    /// Contact phone
    #[serde(default)]
    pub phone: String,
    /// Street address
    #[serde(default)]
    pub address: String,
    /// City
    #[serde(default)]
    pub city: String,
    /// Postal code
    #[serde(default)]
    pub zip: String,
}

impl ShippingDetails {
    /// Name, address, city, zip and phone are all present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.address, &self.city, &self.zip, &self.phone]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// Delivery coordinates picked on the map
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lng: f64,
}

/// An order as stored by the server and mirrored by every client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Six-digit order number
    pub id: OrderId,
    /// Creation time
    pub date: DateTime<Utc>,
    /// Items snapshot
    pub items: Vec<LineItem>,
    /// Amount charged: subtotal − discount + shipping
    pub total: Money,
    /// Current status
    pub status: OrderStatus,
    /// Delivery details
    pub shipping_details: ShippingDetails,
    /// Optional delivery coordinates
    #[serde(default)]
    pub location: Option<Location>,
    /// Promo code redeemed by this order
    #[serde(default)]
    pub applied_promo: Option<String>,
    /// Discount granted by the promo
    #[serde(default)]
    pub discount: Money,
    /// Soft-deleted from the viewer's list
    #[serde(default)]
    pub hidden: bool,
}

impl Order {
    /// Sum of line totals
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(LineItem::total).sum()
    }
}
