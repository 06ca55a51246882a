//! Authoritative order store.
//!
//! [`OrderStoreReducer`] owns every business rule for creating, updating,
//! deleting and hiding orders. It runs inside the runtime `Store`, which
//! reduces one action at a time and publishes the reducer's broadcasts
//! before the next action is processed.
//!
//! Successful mutations broadcast an event (`OrderAdded`, `OrderUpdated`,
//! `OrderDeleted`) carrying the issuing [`ConnectionId`]. Failed mutations
//! broadcast `MutationRejected`, which only the issuer acts upon.

use crate::pricing::{self, price_order};
use crate::promo::{self, PromoContext};
use crate::protocol::ConnectionId;
use crate::types::{LineItem, Location, Money, Order, OrderId, OrderStatus, ShippingDetails};
use bakery_sync_core::effect::Effect;
use bakery_sync_core::environment::{Clock, OrderIdGenerator, MAX_ORDER_ID, MIN_ORDER_ID};
use bakery_sync_core::reducer::Reducer;
use bakery_sync_core::{smallvec, SmallVec};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::pricing::ShippingSettings;
use crate::promo::PromoCatalog;

/// Checkout message for missing shipping fields
pub const MSG_INCOMPLETE_SHIPPING: &str = "Please fill in all shipping details.";

/// Random candidates tried before falling back to a scan of the id range
const ID_ATTEMPTS: usize = 16;

/// How status updates are checked
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Any status may be set on any order
    #[default]
    Permissive,
    /// [`OrderStatus::can_transition_to`] is enforced and only terminal
    /// orders may be deleted
    Strict,
}

/// Store construction options
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Persist `hidden` on the order record instead of ignoring hide requests
    pub durable: bool,
    /// Status update policy
    pub policy: StatusPolicy,
}

/// Why a mutation was not applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// No order with this id
    #[error("Order {0} not found")]
    NotFound(OrderId),

    /// An order with this id already exists
    #[error("Order {0} already exists")]
    DuplicateId(OrderId),

    /// Strict policy refused the status change
    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: OrderStatus,
        /// Requested status
        to: OrderStatus,
    },

    /// Strict policy refused to delete an order still in progress
    #[error("Order {0} is still in progress and cannot be deleted")]
    NotTerminal(OrderId),

    /// Draft or order failed validation; the message is user-facing
    #[error("{0}")]
    Validation(String),

    /// Every six-digit id is taken
    #[error("No order ids left")]
    IdSpaceExhausted,
}

/// Checkout input: everything the customer supplies
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    /// Cart contents
    pub items: Vec<LineItem>,
    /// Delivery details
    pub shipping_details: ShippingDetails,
    /// Optional map pin
    #[serde(default)]
    pub location: Option<Location>,
    /// Promo code as typed by the customer
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Customer has never ordered before
    #[serde(default)]
    pub is_first_order: bool,
}

impl OrderDraft {
    /// Check the fields checkout requires
    ///
    /// # Errors
    ///
    /// [`OrderError::Validation`] if any required shipping field is blank.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.shipping_details.is_complete() {
            Ok(())
        } else {
            Err(OrderError::Validation(MSG_INCOMPLETE_SHIPPING.to_string()))
        }
    }

    /// Normalized promo code, if one was entered
    #[must_use]
    pub fn promo_code(&self) -> Option<String> {
        self.promo_code
            .as_deref()
            .map(promo::normalize_code)
            .filter(|code| !code.is_empty())
    }
}

/// Dashboard figures
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    /// Sum of totals of orders that were not cancelled
    pub total_revenue: Money,
    /// Orders not yet delivered or cancelled
    pub active_orders: usize,
    /// All orders
    pub total_orders: usize,
    /// Distinct customers, by email or by order when no email was given
    pub customers: usize,
}

/// All orders, keyed by id, with creation order
#[derive(Clone, Debug, Default)]
pub struct OrderStoreState {
    orders: HashMap<OrderId, Order>,
    sequence: Vec<OrderId>,
}

impl OrderStoreState {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `orders`, oldest first; later duplicates are dropped
    #[must_use]
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let mut state = Self::new();
        for order in orders {
            if !state.contains(order.id) {
                state.insert(order);
            }
        }
        state
    }

    /// Number of orders
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// No orders
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Order by id
    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Whether the id is taken
    #[must_use]
    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    /// Snapshot for `initialOrders`, newest first
    #[must_use]
    pub fn orders_newest_first(&self) -> Vec<Order> {
        self.sequence
            .iter()
            .rev()
            .filter_map(|id| self.orders.get(id))
            .cloned()
            .collect()
    }

    /// Orders not yet delivered or cancelled
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .count()
    }

    /// Dashboard figures
    #[must_use]
    pub fn stats(&self) -> OrderStats {
        let customers: HashSet<String> = self
            .orders
            .values()
            .map(|o| {
                if o.shipping_details.email.is_empty() {
                    format!("#{}", o.id)
                } else {
                    o.shipping_details.email.to_lowercase()
                }
            })
            .collect();

        OrderStats {
            total_revenue: self
                .orders
                .values()
                .filter(|o| o.status != OrderStatus::Cancelled)
                .map(|o| o.total)
                .sum(),
            active_orders: self.active_count(),
            total_orders: self.len(),
            customers: customers.len(),
        }
    }

    fn insert(&mut self, order: Order) {
        self.sequence.push(order.id);
        self.orders.insert(order.id, order);
    }

    fn remove(&mut self, id: OrderId) -> Option<Order> {
        let removed = self.orders.remove(&id)?;
        self.sequence.retain(|existing| *existing != id);
        Some(removed)
    }
}

/// Actions for the order store
#[derive(Clone, Debug)]
pub enum OrderAction {
    // ========== Commands ==========
    /// Command: checkout. The store assigns id, date and prices the draft.
    PlaceOrder {
        /// Issuer
        origin: ConnectionId,
        /// Customer input
        draft: OrderDraft,
    },

    /// Command: store an order built by a client (relay path)
    NewOrder {
        /// Issuer
        origin: ConnectionId,
        /// Complete order with client-chosen id
        order: Order,
    },

    /// Command: change an order's status
    UpdateStatus {
        /// Issuer
        origin: ConnectionId,
        /// Target order
        order_id: OrderId,
        /// Requested status
        status: OrderStatus,
    },

    /// Command: delete an order permanently
    DeleteOrder {
        /// Issuer
        origin: ConnectionId,
        /// Target order
        order_id: OrderId,
    },

    /// Command: soft-delete an order
    HideOrder {
        /// Issuer
        origin: ConnectionId,
        /// Target order
        order_id: OrderId,
    },

    // ========== Events ==========
    /// Event: an order was stored
    OrderAdded {
        /// Issuer of the causing command
        origin: ConnectionId,
        /// Stored order
        order: Order,
    },

    /// Event: an order's status was set
    OrderUpdated {
        /// Issuer of the causing command
        origin: ConnectionId,
        /// Updated order
        order_id: OrderId,
        /// New status
        status: OrderStatus,
    },

    /// Event: an order was deleted
    OrderDeleted {
        /// Issuer of the causing command
        origin: ConnectionId,
        /// Deleted order
        order_id: OrderId,
    },

    /// Event: a command was refused; only `origin` is told
    MutationRejected {
        /// Issuer of the refused command
        origin: ConnectionId,
        /// Reason
        error: OrderError,
    },
}

impl OrderAction {
    /// Who issued this action (or the command that caused it)
    #[must_use]
    pub const fn origin(&self) -> ConnectionId {
        match self {
            Self::PlaceOrder { origin, .. }
            | Self::NewOrder { origin, .. }
            | Self::UpdateStatus { origin, .. }
            | Self::DeleteOrder { origin, .. }
            | Self::HideOrder { origin, .. }
            | Self::OrderAdded { origin, .. }
            | Self::OrderUpdated { origin, .. }
            | Self::OrderDeleted { origin, .. }
            | Self::MutationRejected { origin, .. } => *origin,
        }
    }

    /// `true` for events, `false` for commands
    #[must_use]
    pub const fn is_event(&self) -> bool {
        matches!(
            self,
            Self::OrderAdded { .. }
                | Self::OrderUpdated { .. }
                | Self::OrderDeleted { .. }
                | Self::MutationRejected { .. }
        )
    }
}

/// Dependencies of the order store
#[derive(Clone)]
pub struct OrderEnvironment {
    /// Timestamps for new orders
    pub clock: Arc<dyn Clock>,
    /// Candidate ids for new orders
    pub ids: Arc<dyn OrderIdGenerator>,
    /// Promo codes, read at placement and updated on redemption
    pub promos: Arc<dyn PromoCatalog>,
    /// Current shipping fee rules
    pub shipping: Arc<ShippingSettings>,
}

impl OrderEnvironment {
    /// Creates a new order environment
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn OrderIdGenerator>,
        promos: Arc<dyn PromoCatalog>,
        shipping: Arc<ShippingSettings>,
    ) -> Self {
        Self {
            clock,
            ids,
            promos,
            shipping,
        }
    }
}

/// Reducer implementing the authoritative order store
#[derive(Clone, Debug, Default)]
pub struct OrderStoreReducer {
    options: StoreOptions,
}

impl OrderStoreReducer {
    /// Permissive, non-durable store
    #[must_use]
    pub const fn new() -> Self {
        Self::with_options(StoreOptions {
            durable: false,
            policy: StatusPolicy::Permissive,
        })
    }

    /// Store with explicit options
    #[must_use]
    pub const fn with_options(options: StoreOptions) -> Self {
        Self { options }
    }

    /// Options this store was built with
    #[must_use]
    pub const fn options(&self) -> StoreOptions {
        self.options
    }

    /// Pick an unused id: random candidates first, then a scan of the range
    fn assign_id(
        state: &OrderStoreState,
        ids: &dyn OrderIdGenerator,
    ) -> Result<OrderId, OrderError> {
        for _ in 0..ID_ATTEMPTS {
            let candidate = OrderId::new(ids.next_id());
            if !state.contains(candidate) {
                return Ok(candidate);
            }
        }

        tracing::warn!(attempts = ID_ATTEMPTS, "Order id candidates collided, scanning");
        (MIN_ORDER_ID..=MAX_ORDER_ID)
            .map(OrderId::new)
            .find(|candidate| !state.contains(*candidate))
            .ok_or(OrderError::IdSpaceExhausted)
    }

    /// Build an order from a checkout draft
    fn price_draft(
        state: &OrderStoreState,
        draft: OrderDraft,
        env: &OrderEnvironment,
    ) -> Result<Order, OrderError> {
        draft.validate()?;

        let promo = match draft.promo_code() {
            None => None,
            Some(code) => {
                let context = PromoContext {
                    cart_total: pricing::subtotal(&draft.items),
                    is_first_order: draft.is_first_order,
                };
                let validation = promo::validate_code(env.promos.as_ref(), &code, &context);
                if !validation.valid {
                    return Err(OrderError::Validation(validation.message));
                }
                validation.promo
            },
        };

        let breakdown = price_order(&draft.items, promo.as_ref(), &env.shipping.get());
        let id = Self::assign_id(state, env.ids.as_ref())?;

        Ok(Order {
            id,
            date: env.clock.now(),
            items: draft.items,
            total: breakdown.total,
            status: OrderStatus::Preparing,
            shipping_details: draft.shipping_details,
            location: draft.location,
            applied_promo: promo.map(|p| p.code),
            discount: breakdown.discount,
            hidden: false,
        })
    }

    /// Check the promo a relayed order claims, normalizing its code
    ///
    /// The relaying peer already priced the order, so only existence,
    /// activity and remaining redemptions are checked here.
    fn check_relayed_promo(order: &mut Order, env: &OrderEnvironment) -> Result<(), OrderError> {
        let Some(code) = order.applied_promo.take() else {
            return Ok(());
        };
        let code = promo::normalize_code(&code);
        if code.is_empty() {
            return Ok(());
        }

        match env.promos.get_promo(&code) {
            Some(found) if !found.active => {
                Err(OrderError::Validation(promo::MSG_NOT_FOUND.to_string()))
            },
            Some(found) if found.is_exhausted() => {
                Err(OrderError::Validation(promo::MSG_USAGE_LIMIT.to_string()))
            },
            Some(_) => {
                order.applied_promo = Some(code);
                Ok(())
            },
            None => Err(OrderError::Validation(promo::MSG_NOT_FOUND.to_string())),
        }
    }

    /// Count the redemption of the order's promo, if any
    fn redeem(order: &Order, env: &OrderEnvironment) {
        if let Some(code) = &order.applied_promo {
            if let Err(error) = env.promos.increment_usage(code) {
                tracing::warn!(order_id = %order.id, %error, "Promo usage not recorded");
            }
        }
    }

    fn validate_status(&self, order: &Order, next: OrderStatus) -> Result<(), OrderError> {
        match self.options.policy {
            StatusPolicy::Permissive => Ok(()),
            StatusPolicy::Strict if order.status.can_transition_to(next) => Ok(()),
            StatusPolicy::Strict => Err(OrderError::InvalidTransition {
                from: order.status,
                to: next,
            }),
        }
    }

    fn validate_delete(&self, order: &Order) -> Result<(), OrderError> {
        match self.options.policy {
            StatusPolicy::Strict if !order.status.is_terminal() => {
                Err(OrderError::NotTerminal(order.id))
            },
            StatusPolicy::Permissive | StatusPolicy::Strict => Ok(()),
        }
    }

    fn store(
        state: &mut OrderStoreState,
        origin: ConnectionId,
        order: Order,
        env: &OrderEnvironment,
    ) -> SmallVec<[Effect<OrderAction>; 4]> {
        tracing::info!(order_id = %order.id, %origin, total = %order.total, "Order stored");
        Self::redeem(&order, env);
        state.insert(order.clone());
        smallvec![Effect::Broadcast(OrderAction::OrderAdded { origin, order })]
    }

    fn reject(origin: ConnectionId, error: OrderError) -> SmallVec<[Effect<OrderAction>; 4]> {
        tracing::warn!(%origin, %error, "Mutation rejected");
        smallvec![Effect::Broadcast(OrderAction::MutationRejected { origin, error })]
    }
}

impl Reducer for OrderStoreReducer {
    type State = OrderStoreState;
    type Action = OrderAction;
    type Environment = OrderEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            OrderAction::PlaceOrder { origin, draft } => {
                match Self::price_draft(state, draft, env) {
                    Ok(order) => Self::store(state, origin, order, env),
                    Err(error) => Self::reject(origin, error),
                }
            },

            OrderAction::NewOrder { origin, mut order } => {
                if state.contains(order.id) {
                    return Self::reject(origin, OrderError::DuplicateId(order.id));
                }
                if order.total < Money::ZERO {
                    return Self::reject(
                        origin,
                        OrderError::Validation("Order total must not be negative".to_string()),
                    );
                }
                if let Err(error) = Self::check_relayed_promo(&mut order, env) {
                    return Self::reject(origin, error);
                }
                if !self.options.durable {
                    order.hidden = false;
                }
                Self::store(state, origin, order, env)
            },

            OrderAction::UpdateStatus {
                origin,
                order_id,
                status,
            } => {
                let Some(order) = state.orders.get_mut(&order_id) else {
                    return Self::reject(origin, OrderError::NotFound(order_id));
                };
                if let Err(error) = self.validate_status(order, status) {
                    return Self::reject(origin, error);
                }

                tracing::info!(%order_id, from = %order.status, to = %status, "Order status updated");
                order.status = status;
                smallvec![Effect::Broadcast(OrderAction::OrderUpdated {
                    origin,
                    order_id,
                    status,
                })]
            },

            OrderAction::DeleteOrder { origin, order_id } => {
                let Some(order) = state.get(order_id) else {
                    tracing::debug!(%order_id, "Delete of unknown order ignored");
                    return smallvec![Effect::None];
                };
                if let Err(error) = self.validate_delete(order) {
                    return Self::reject(origin, error);
                }

                state.remove(order_id);
                tracing::info!(%order_id, %origin, "Order deleted");
                smallvec![Effect::Broadcast(OrderAction::OrderDeleted { origin, order_id })]
            },

            OrderAction::HideOrder { origin, order_id } => {
                if !self.options.durable {
                    tracing::debug!(%order_id, %origin, "Hide ignored: hiding is client-local");
                    return smallvec![Effect::None];
                }
                match state.orders.get_mut(&order_id) {
                    Some(order) => {
                        order.hidden = true;
                        tracing::info!(%order_id, "Order hidden");
                    },
                    None => tracing::debug!(%order_id, "Hide of unknown order ignored"),
                }
                smallvec![Effect::None]
            },

            // Events are outputs of this reducer, never inputs
            OrderAction::OrderAdded { .. }
            | OrderAction::OrderUpdated { .. }
            | OrderAction::OrderDeleted { .. }
            | OrderAction::MutationRejected { .. } => smallvec![Effect::None],
        }
    }
}
