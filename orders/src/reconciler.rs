//! Client-side order projection.
//!
//! Each client keeps a replica of the order list, newest first. Local
//! mutations are applied optimistically and queued for the server; server
//! events are merged idempotently, so receiving an event for a mutation the
//! client already applied (self-echo) is harmless.
//!
//! The projection only tracks the server while [`SyncStatus::Live`]. After the
//! transport drops it is `Stale`: local mutations still apply but are not
//! queued, and the next `initialOrders` snapshot replaces everything.

use crate::protocol::{ClientCommand, ServerEvent, StatusUpdate};
use crate::types::{Order, OrderId, OrderStatus};
use bakery_sync_core::effect::Effect;
use bakery_sync_core::reducer::Reducer;
use bakery_sync_core::{smallvec, SmallVec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;

/// Connection state of a projection
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Waiting for the first snapshot
    #[default]
    Connecting,
    /// Snapshot received, following incremental events
    Live,
    /// Transport lost; contents frozen until the next snapshot
    Stale,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Live => write!(f, "live"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// A client's replica of the order list
#[derive(Clone, Debug, Default)]
pub struct Projection {
    orders: Vec<Order>,
    hidden: HashSet<OrderId>,
    status: SyncStatus,
}

impl Projection {
    /// Empty projection waiting for its first snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection state
    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        self.status
    }

    /// Every order, hidden ones included, newest first
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Order by id
    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    /// Number of orders, hidden ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// No orders at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Orders the viewer has not hidden
    pub fn visible_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| !o.hidden)
    }

    /// Visible orders still in progress
    #[must_use]
    pub fn active(&self) -> Vec<&Order> {
        self.visible_orders()
            .filter(|o| !o.status.is_terminal())
            .collect()
    }

    /// Visible delivered orders
    #[must_use]
    pub fn delivered(&self) -> Vec<&Order> {
        self.with_status(OrderStatus::Delivered)
    }

    /// Visible cancelled orders
    #[must_use]
    pub fn cancelled(&self) -> Vec<&Order> {
        self.with_status(OrderStatus::Cancelled)
    }

    fn with_status(&self, status: OrderStatus) -> Vec<&Order> {
        self.visible_orders().filter(|o| o.status == status).collect()
    }

    fn position(&self, id: OrderId) -> Option<usize> {
        self.orders.iter().position(|o| o.id == id)
    }

    /// Prepend unless present; `true` if inserted
    fn add(&mut self, mut order: Order) -> bool {
        if self.position(order.id).is_some() {
            return false;
        }
        if self.hidden.contains(&order.id) {
            order.hidden = true;
        }
        self.orders.insert(0, order);
        true
    }

    fn set_status(&mut self, id: OrderId, status: OrderStatus) -> bool {
        match self.orders.iter_mut().find(|o| o.id == id) {
            Some(order) => {
                order.status = status;
                true
            },
            None => false,
        }
    }

    fn remove(&mut self, id: OrderId) -> bool {
        self.hidden.remove(&id);
        match self.position(id) {
            Some(index) => {
                self.orders.remove(index);
                true
            },
            None => false,
        }
    }

    fn hide(&mut self, id: OrderId) -> bool {
        match self.orders.iter_mut().find(|o| o.id == id) {
            Some(order) => {
                order.hidden = true;
                self.hidden.insert(id);
                true
            },
            None => false,
        }
    }

    /// Replace everything with a server snapshot, keeping local hides
    fn replace(&mut self, mut orders: Vec<Order>) {
        for order in &mut orders {
            if self.hidden.contains(&order.id) {
                order.hidden = true;
            }
        }
        self.hidden
            .retain(|id| orders.iter().any(|order| order.id == *id));
        self.orders = orders;
    }
}

/// Actions for a client projection
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionAction {
    // ========== Local mutations ==========
    /// Place an order built on this client
    PlaceOrder(Order),
    /// Change an order's status
    UpdateStatus {
        /// Target order
        order_id: OrderId,
        /// New status
        status: OrderStatus,
    },
    /// Delete an order
    DeleteOrder(OrderId),
    /// Hide an order from this viewer
    HideOrder(OrderId),

    // ========== Transport ==========
    /// A connection attempt started
    Connecting,
    /// A frame arrived from the server
    Inbound(ServerEvent),
    /// The connection dropped
    TransportLost,

    // ========== Events ==========
    /// Connection state changed
    StatusChanged(SyncStatus),
}

/// Queue of commands waiting to be written to the current connection
///
/// The connection task attaches a fresh channel on every connect and
/// detaches it when the socket closes.
#[derive(Debug, Default)]
pub struct Outbox {
    sender: RwLock<Option<mpsc::UnboundedSender<ClientCommand>>>,
}

impl Outbox {
    /// Outbox with no connection attached
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route commands to a new connection
    pub fn attach(&self, sender: mpsc::UnboundedSender<ClientCommand>) {
        *self.sender.write().unwrap_or_else(PoisonError::into_inner) = Some(sender);
    }

    /// Drop the current connection, if any
    pub fn detach(&self) {
        *self.sender.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Queue a command; `false` if no connection accepted it
    pub fn send(&self, command: ClientCommand) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sender| sender.send(command).is_ok())
    }
}

/// Dependencies of a projection
#[derive(Clone, Debug)]
pub struct ProjectionEnvironment {
    /// Commands for the server
    pub outbox: std::sync::Arc<Outbox>,
}

impl ProjectionEnvironment {
    /// Creates a new projection environment
    #[must_use]
    pub const fn new(outbox: std::sync::Arc<Outbox>) -> Self {
        Self { outbox }
    }
}

/// Reducer merging local mutations and server events into a [`Projection`]
#[derive(Clone, Debug, Default)]
pub struct ProjectionReducer {
    durable: bool,
}

impl ProjectionReducer {
    /// Reducer whose hides stay on this client
    #[must_use]
    pub const fn new() -> Self {
        Self { durable: false }
    }

    /// Reducer that also sends hides to a durable server
    #[must_use]
    pub const fn durable() -> Self {
        Self { durable: true }
    }

    /// Queue `command` if live; on a closed outbox the projection goes stale
    fn forward(
        state: &mut Projection,
        command: ClientCommand,
        env: &ProjectionEnvironment,
        effects: &mut SmallVec<[Effect<ProjectionAction>; 4]>,
    ) {
        if state.status != SyncStatus::Live {
            tracing::debug!(status = %state.status, "Not live, command kept local");
            return;
        }
        if !env.outbox.send(command) {
            tracing::warn!("Outbox closed, projection is stale");
            Self::transition(state, SyncStatus::Stale, effects);
        }
    }

    fn transition(
        state: &mut Projection,
        next: SyncStatus,
        effects: &mut SmallVec<[Effect<ProjectionAction>; 4]>,
    ) {
        if state.status != next {
            tracing::info!(from = %state.status, to = %next, "Sync status changed");
            state.status = next;
            effects.push(Effect::Broadcast(ProjectionAction::StatusChanged(next)));
        }
    }

    fn apply_inbound(
        state: &mut Projection,
        event: &ServerEvent,
        effects: &mut SmallVec<[Effect<ProjectionAction>; 4]>,
    ) -> bool {
        match event {
            ServerEvent::InitialOrders(orders) => {
                tracing::debug!(count = orders.len(), "Snapshot received");
                state.replace(orders.clone());
                Self::transition(state, SyncStatus::Live, effects);
                true
            },
            ServerEvent::OrderAdded(order) => state.add(order.clone()),
            ServerEvent::OrderUpdated(StatusUpdate { order_id, status }) => {
                state.set_status(*order_id, *status)
            },
            ServerEvent::OrderDeleted(order_id) => state.remove(*order_id),
            ServerEvent::Error(payload) => {
                tracing::warn!(message = %payload.message, "Server rejected a mutation");
                true
            },
        }
    }
}

impl Reducer for ProjectionReducer {
    type State = Projection;
    type Action = ProjectionAction;
    type Environment = ProjectionEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut effects: SmallVec<[Effect<Self::Action>; 4]> = SmallVec::new();

        match action {
            ProjectionAction::PlaceOrder(order) => {
                if !state.add(order.clone()) {
                    tracing::warn!(order_id = %order.id, "Order id already in projection");
                    return smallvec![Effect::None];
                }
                effects.push(Effect::Broadcast(ProjectionAction::PlaceOrder(order.clone())));
                Self::forward(state, ClientCommand::NewOrder(order), env, &mut effects);
            },

            ProjectionAction::UpdateStatus { order_id, status } => {
                if state.set_status(order_id, status) {
                    effects.push(Effect::Broadcast(ProjectionAction::UpdateStatus {
                        order_id,
                        status,
                    }));
                }
                Self::forward(
                    state,
                    ClientCommand::UpdateOrderStatus(StatusUpdate { order_id, status }),
                    env,
                    &mut effects,
                );
            },

            ProjectionAction::DeleteOrder(order_id) => {
                if state.remove(order_id) {
                    effects.push(Effect::Broadcast(ProjectionAction::DeleteOrder(order_id)));
                }
                Self::forward(state, ClientCommand::DeleteOrder(order_id), env, &mut effects);
            },

            ProjectionAction::HideOrder(order_id) => {
                if state.hide(order_id) {
                    effects.push(Effect::Broadcast(ProjectionAction::HideOrder(order_id)));
                }
                if self.durable {
                    Self::forward(state, ClientCommand::HideOrder(order_id), env, &mut effects);
                }
            },

            ProjectionAction::Connecting => {
                if state.status != SyncStatus::Live {
                    Self::transition(state, SyncStatus::Connecting, &mut effects);
                }
            },

            ProjectionAction::Inbound(event) => {
                if Self::apply_inbound(state, &event, &mut effects) {
                    effects.insert(0, Effect::Broadcast(ProjectionAction::Inbound(event)));
                } else {
                    tracing::debug!(event = event.name(), "Event already reflected");
                }
            },

            ProjectionAction::TransportLost => {
                Self::transition(state, SyncStatus::Stale, &mut effects);
            },

            ProjectionAction::StatusChanged(_) => {},
        }

        if effects.is_empty() {
            effects.push(Effect::None);
        }
        effects
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{LineItem, Money, ShippingDetails};
    use bakery_sync_testing::{assertions, test_clock, ReducerTest};
    use bakery_sync_core::environment::Clock;
    use std::sync::Arc;

    fn order(id: u64, status: OrderStatus) -> Order {
        Order {
            id: OrderId::new(id),
            date: test_clock().now(),
            items: vec![LineItem::new(1, "Brownie", Money::from_major(4), 1)],
            total: Money::from_major(4),
            status,
            shipping_details: ShippingDetails::default(),
            location: None,
            applied_promo: None,
            discount: Money::ZERO,
            hidden: false,
        }
    }

    fn live(orders: Vec<Order>) -> Projection {
        let mut projection = Projection::new();
        projection.replace(orders);
        projection.status = SyncStatus::Live;
        projection
    }

    fn wired() -> (ProjectionEnvironment, mpsc::UnboundedReceiver<ClientCommand>) {
        let outbox = Arc::new(Outbox::new());
        let (tx, rx) = mpsc::unbounded_channel();
        outbox.attach(tx);
        (ProjectionEnvironment::new(outbox), rx)
    }

    fn ids(projection: &Projection) -> Vec<u64> {
        projection.orders().iter().map(|o| o.id.value()).collect()
    }

    #[test]
    fn snapshot_replaces_and_goes_live() {
        let (env, _rx) = wired();
        let mut projection = Projection::new();
        let effects = ProjectionReducer::new().reduce(
            &mut projection,
            ProjectionAction::Inbound(ServerEvent::InitialOrders(vec![
                order(2, OrderStatus::Baked),
                order(1, OrderStatus::Delivered),
            ])),
            &env,
        );

        assert_eq!(ids(&projection), vec![2, 1]);
        assert_eq!(projection.status(), SyncStatus::Live);
        let broadcasts = assertions::broadcasts(&effects);
        assert!(matches!(broadcasts[0], ProjectionAction::Inbound(ServerEvent::InitialOrders(_))));
        assert_eq!(broadcasts[1], &ProjectionAction::StatusChanged(SyncStatus::Live));
    }

    #[test]
    fn added_order_is_idempotent() {
        let (env, _rx) = wired();
        ReducerTest::new(ProjectionReducer::new())
            .with_env(env)
            .given_state(live(vec![order(1, OrderStatus::Preparing)]))
            .given_actions([ProjectionAction::Inbound(ServerEvent::OrderAdded(order(
                2,
                OrderStatus::Preparing,
            )))])
            .when_action(ProjectionAction::Inbound(ServerEvent::OrderAdded(order(
                2,
                OrderStatus::Preparing,
            ))))
            .then_state(|projection| assert_eq!(ids(projection), vec![2, 1]))
            .then_effects(|effects| assertions::assert_no_broadcast(effects))
            .run();
    }

    #[test]
    fn update_for_unknown_order_is_ignored() {
        let (env, _rx) = wired();
        ReducerTest::new(ProjectionReducer::new())
            .with_env(env)
            .given_state(live(vec![order(1, OrderStatus::Preparing)]))
            .when_action(ProjectionAction::Inbound(ServerEvent::OrderUpdated(StatusUpdate {
                order_id: OrderId::new(9),
                status: OrderStatus::Delivered,
            })))
            .then_state(|projection| {
                assert_eq!(projection.get(OrderId::new(1)).unwrap().status, OrderStatus::Preparing);
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn delete_twice_is_harmless() {
        let (env, _rx) = wired();
        ReducerTest::new(ProjectionReducer::new())
            .with_env(env)
            .given_state(live(vec![order(1, OrderStatus::Cancelled)]))
            .given_actions([ProjectionAction::Inbound(ServerEvent::OrderDeleted(OrderId::new(1)))])
            .when_action(ProjectionAction::Inbound(ServerEvent::OrderDeleted(OrderId::new(1))))
            .then_state(|projection| assert!(projection.is_empty()))
            .then_effects(|effects| assertions::assert_no_broadcast(effects))
            .run();
    }

    #[test]
    fn local_mutations_apply_and_forward() {
        let (env, mut rx) = wired();
        let reducer = ProjectionReducer::new();
        let mut projection = live(vec![]);

        reducer.reduce(&mut projection, ProjectionAction::PlaceOrder(order(5, OrderStatus::Preparing)), &env);
        reducer.reduce(
            &mut projection,
            ProjectionAction::UpdateStatus {
                order_id: OrderId::new(5),
                status: OrderStatus::Baked,
            },
            &env,
        );
        reducer.reduce(&mut projection, ProjectionAction::DeleteOrder(OrderId::new(5)), &env);

        assert!(projection.is_empty());
        assert!(matches!(rx.try_recv().unwrap(), ClientCommand::NewOrder(o) if o.id == OrderId::new(5)));
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientCommand::UpdateOrderStatus(StatusUpdate {
                order_id: OrderId::new(5),
                status: OrderStatus::Baked,
            })
        );
        assert_eq!(rx.try_recv().unwrap(), ClientCommand::DeleteOrder(OrderId::new(5)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn hide_stays_local_unless_durable() {
        let (env, mut rx) = wired();
        let mut projection = live(vec![order(1, OrderStatus::Delivered)]);

        ProjectionReducer::new().reduce(&mut projection, ProjectionAction::HideOrder(OrderId::new(1)), &env);
        assert!(rx.try_recv().is_err());
        assert_eq!(projection.visible_orders().count(), 0);
        assert_eq!(projection.len(), 1);

        ProjectionReducer::durable().reduce(&mut projection, ProjectionAction::HideOrder(OrderId::new(1)), &env);
        assert_eq!(rx.try_recv().unwrap(), ClientCommand::HideOrder(OrderId::new(1)));
    }

    #[test]
    fn hides_survive_resnapshot() {
        let (env, _rx) = wired();
        ReducerTest::new(ProjectionReducer::new())
            .with_env(env)
            .given_state(live(vec![order(1, OrderStatus::Delivered), order(2, OrderStatus::Baked)]))
            .given_actions([ProjectionAction::HideOrder(OrderId::new(1)), ProjectionAction::TransportLost])
            .when_action(ProjectionAction::Inbound(ServerEvent::InitialOrders(vec![
                order(2, OrderStatus::Baked),
                order(1, OrderStatus::Delivered),
            ])))
            .then_state(|projection| {
                assert_eq!(projection.status(), SyncStatus::Live);
                let visible: Vec<_> = projection.visible_orders().map(|o| o.id.value()).collect();
                assert_eq!(visible, vec![2]);
            })
            .run();
    }

    #[test]
    fn stale_projection_keeps_mutations_local() {
        let (env, mut rx) = wired();
        ReducerTest::new(ProjectionReducer::new())
            .with_env(env.clone())
            .given_state(live(vec![order(1, OrderStatus::Preparing)]))
            .given_actions([ProjectionAction::TransportLost])
            .when_action(ProjectionAction::UpdateStatus {
                order_id: OrderId::new(1),
                status: OrderStatus::Cancelled,
            })
            .then_state(|projection| {
                assert_eq!(projection.status(), SyncStatus::Stale);
                assert_eq!(projection.get(OrderId::new(1)).unwrap().status, OrderStatus::Cancelled);
            })
            .run();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_outbox_marks_stale() {
        let env = ProjectionEnvironment::new(Arc::new(Outbox::new()));
        ReducerTest::new(ProjectionReducer::new())
            .with_env(env)
            .given_state(live(vec![]))
            .when_action(ProjectionAction::PlaceOrder(order(3, OrderStatus::Preparing)))
            .then_state(|projection| {
                assert_eq!(projection.status(), SyncStatus::Stale);
                assert_eq!(projection.len(), 1);
            })
            .then_effects(|effects| {
                assert_eq!(
                    assertions::broadcasts(effects).last(),
                    Some(&&ProjectionAction::StatusChanged(SyncStatus::Stale))
                );
            })
            .run();
    }

    #[test]
    fn storefront_tabs() {
        let mut projection = live(vec![
            order(5, OrderStatus::OutForDelivery),
            order(4, OrderStatus::Cancelled),
            order(3, OrderStatus::Delivered),
            order(2, OrderStatus::Preparing),
            order(1, OrderStatus::Delivered),
        ]);
        projection.hide(OrderId::new(1));

        let tab = |orders: Vec<&Order>| orders.iter().map(|o| o.id.value()).collect::<Vec<_>>();
        assert_eq!(tab(projection.active()), vec![5, 2]);
        assert_eq!(tab(projection.delivered()), vec![3]);
        assert_eq!(tab(projection.cancelled()), vec![4]);
    }

    #[test]
    fn connecting_does_not_demote_live() {
        let (env, _rx) = wired();
        ReducerTest::new(ProjectionReducer::new())
            .with_env(env)
            .given_state(live(vec![]))
            .when_action(ProjectionAction::Connecting)
            .then_state(|projection| assert_eq!(projection.status(), SyncStatus::Live))
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }
}
