//! Wire protocol of the sync channel.
//!
//! Every frame is a JSON text message `{"event": <name>, "payload": <data>}`.
//!
//! | Direction | Event | Payload |
//! |-----------|-------|---------|
//! | server → client | `initialOrders` | array of orders, newest first |
//! | server → client | `orderAdded` | order |
//! | server → client | `orderUpdated` | `{orderId, status}` |
//! | server → client | `orderDeleted` | raw order id |
//! | server → client | `error` | `{message}` |
//! | client → server | `newOrder` | order |
//! | client → server | `updateOrderStatus` | `{orderId, status}` |
//! | client → server | `deleteOrder` | raw order id |
//! | client → server | `hideOrder` | raw order id |

use crate::store::OrderAction;
use crate::types::{Order, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies who issued a store action
///
/// Each sync connection gets one for its lifetime; one-shot API requests
/// take a fresh one per call so they can match the store's reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocate a process-unique id
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value (tests and fixtures)
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// `{orderId, status}` payload
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// Target order
    pub order_id: OrderId,
    /// New status
    pub status: OrderStatus,
}

/// `{message}` payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable reason
    pub message: String,
}

/// Server → client frames
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full snapshot, sent first on every connection and after any resync
    InitialOrders(Vec<Order>),
    /// An order was stored
    OrderAdded(Order),
    /// An order's status changed
    OrderUpdated(StatusUpdate),
    /// An order was removed
    OrderDeleted(OrderId),
    /// The connection's last mutation was rejected
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Incremental event for a store broadcast
    ///
    /// Commands and rejections have no incremental wire form.
    #[must_use]
    pub fn from_action(action: &OrderAction) -> Option<Self> {
        match action {
            OrderAction::OrderAdded { order, .. } => Some(Self::OrderAdded(order.clone())),
            OrderAction::OrderUpdated {
                order_id, status, ..
            } => Some(Self::OrderUpdated(StatusUpdate {
                order_id: *order_id,
                status: *status,
            })),
            OrderAction::OrderDeleted { order_id, .. } => Some(Self::OrderDeleted(*order_id)),
            OrderAction::PlaceOrder { .. }
            | OrderAction::NewOrder { .. }
            | OrderAction::UpdateStatus { .. }
            | OrderAction::DeleteOrder { .. }
            | OrderAction::HideOrder { .. }
            | OrderAction::MutationRejected { .. } => None,
        }
    }

    /// Event name as it appears on the wire
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InitialOrders(_) => "initialOrders",
            Self::OrderAdded(_) => "orderAdded",
            Self::OrderUpdated(_) => "orderUpdated",
            Self::OrderDeleted(_) => "orderDeleted",
            Self::Error(_) => "error",
        }
    }
}

/// Client → server frames
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Store a client-built order
    NewOrder(Order),
    /// Change an order's status
    UpdateOrderStatus(StatusUpdate),
    /// Remove an order
    DeleteOrder(OrderId),
    /// Soft-delete an order (honoured only by durable stores)
    HideOrder(OrderId),
}

impl ClientCommand {
    /// Store action for this command, attributed to `origin`
    #[must_use]
    pub fn into_action(self, origin: ConnectionId) -> OrderAction {
        match self {
            Self::NewOrder(order) => OrderAction::NewOrder { origin, order },
            Self::UpdateOrderStatus(StatusUpdate { order_id, status }) => {
                OrderAction::UpdateStatus {
                    origin,
                    order_id,
                    status,
                }
            },
            Self::DeleteOrder(order_id) => OrderAction::DeleteOrder { origin, order_id },
            Self::HideOrder(order_id) => OrderAction::HideOrder { origin, order_id },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_update_frame() {
        let frame = ServerEvent::OrderUpdated(StatusUpdate {
            order_id: OrderId::new(100_001),
            status: OrderStatus::Delivered,
        });
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"event": "orderUpdated", "payload": {"orderId": 100_001, "status": "delivered"}})
        );
    }

    #[test]
    fn delete_frames_carry_raw_ids() {
        assert_eq!(
            serde_json::to_value(ServerEvent::OrderDeleted(OrderId::new(42))).unwrap(),
            json!({"event": "orderDeleted", "payload": 42})
        );

        let command: ClientCommand =
            serde_json::from_str(r#"{"event":"deleteOrder","payload":999999}"#).unwrap();
        assert_eq!(command, ClientCommand::DeleteOrder(OrderId::new(999_999)));
    }

    #[test]
    fn snapshot_and_error_frames() {
        assert_eq!(
            serde_json::to_value(ServerEvent::InitialOrders(vec![])).unwrap(),
            json!({"event": "initialOrders", "payload": []})
        );
        let error = ServerEvent::Error(ErrorPayload {
            message: "Order 7 already exists".into(),
        });
        assert_eq!(error.name(), "error");
        assert_eq!(
            serde_json::to_value(error).unwrap()["payload"]["message"],
            json!("Order 7 already exists")
        );
    }

    #[test]
    fn unknown_events_are_rejected() {
        let parsed = serde_json::from_str::<ClientCommand>(r#"{"event":"dropTables","payload":1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn commands_keep_their_origin() {
        let origin = ConnectionId::from_raw(9);
        let action = ClientCommand::UpdateOrderStatus(StatusUpdate {
            order_id: OrderId::new(5),
            status: OrderStatus::Baked,
        })
        .into_action(origin);
        assert_eq!(action.origin(), origin);
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::next(), ConnectionId::next());
    }
}
