//! WebSocket sync channel.
//!
//! Every connection receives `initialOrders` first, then one incremental
//! event per store broadcast, in store order. Commands arriving on the socket
//! are dispatched to the store attributed to this connection.
//!
//! ```text
//! Client          Sync handler               Store
//!   │                    │                     │
//!   ├─ Connect ─────────>│                     │
//!   │                    ├─ subscribe_with() ─>│  snapshot + receiver, atomically
//!   │<─ initialOrders ───┤                     │
//!   │                    │                     │
//!   ├─ updateOrderStatus>│                     │
//!   │                    ├─ send() ───────────>│
//!   │                    │<── broadcast ───────┤
//!   │<─ orderUpdated ────┤  (other connections) │
//! ```
//!
//! A connection that falls behind the broadcast buffer, or whose own command
//! was rejected, is sent a fresh snapshot instead of the missed events.

use crate::config::SelfEcho;
use crate::state::{AppState, OrderStore};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use bakery_orders::protocol::ErrorPayload;
use bakery_orders::{ClientCommand, ConnectionId, OrderAction, OrderStoreState, ServerEvent};
use bakery_sync_runtime::metrics::SyncMetrics;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// What a single connection does with a store broadcast
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Nothing to send
    Skip,
    /// Forward as an incremental event
    Forward(ServerEvent),
    /// This connection's command failed: send the reason and a snapshot
    Reject(String),
}

/// Decide how `action` reaches the connection `me`
#[must_use]
pub fn route(action: &OrderAction, me: ConnectionId, self_echo: SelfEcho) -> Delivery {
    if let OrderAction::MutationRejected { origin, error } = action {
        return if *origin == me {
            Delivery::Reject(error.to_string())
        } else {
            Delivery::Skip
        };
    }
    if action.origin() == me && self_echo == SelfEcho::Skip {
        return Delivery::Skip;
    }
    ServerEvent::from_action(action).map_or(Delivery::Skip, Delivery::Forward)
}

/// `GET /ws`
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state))
}

/// Decrements the connection gauge however the connection ends
struct ConnectionGuard {
    origin: ConnectionId,
}

impl ConnectionGuard {
    fn open(origin: ConnectionId) -> Self {
        SyncMetrics::connection_opened();
        info!(%origin, "Sync connection opened");
        Self { origin }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SyncMetrics::connection_closed();
        info!(origin = %self.origin, "Sync connection closed");
    }
}

type Outgoing = SplitSink<WebSocket, Message>;

async fn send_event(sink: &mut Outgoing, event: &ServerEvent) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json)).await,
        Err(e) => {
            warn!(error = %e, event = event.name(), "Failed to serialize event");
            Ok(())
        },
    }
}

/// Send a fresh snapshot and return the receiver that continues after it
async fn resync(
    store: &OrderStore,
    sink: &mut Outgoing,
) -> Result<broadcast::Receiver<OrderAction>, axum::Error> {
    let (snapshot, rx) = store
        .subscribe_with(OrderStoreState::orders_newest_first)
        .await;
    send_event(sink, &ServerEvent::InitialOrders(snapshot)).await?;
    Ok(rx)
}

#[allow(clippy::cognitive_complexity)] // Connection lifecycle with two tasks
async fn serve_connection(socket: WebSocket, state: AppState) {
    let origin = ConnectionId::next();
    let _guard = ConnectionGuard::open(origin);
    let self_echo = state.config.sync.self_echo;

    let (mut sink, mut stream) = socket.split();

    let Ok(mut rx) = resync(&state.store, &mut sink).await else {
        debug!(%origin, "Connection closed before the snapshot was sent");
        return;
    };

    let store = Arc::clone(&state.store);
    let mut send_task = tokio::spawn(async move {
        loop {
            let outcome = match rx.recv().await {
                Ok(action) => match route(&action, origin, self_echo) {
                    Delivery::Skip => Ok(()),
                    Delivery::Forward(event) => {
                        debug!(%origin, event = event.name(), "Forwarding event");
                        send_event(&mut sink, &event).await
                    },
                    Delivery::Reject(message) => {
                        SyncMetrics::record_resync();
                        let error = ServerEvent::Error(ErrorPayload { message });
                        match send_event(&mut sink, &error).await {
                            Ok(()) => match resync(&store, &mut sink).await {
                                Ok(fresh) => {
                                    rx = fresh;
                                    Ok(())
                                },
                                Err(e) => Err(e),
                            },
                            Err(e) => Err(e),
                        }
                    },
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%origin, skipped, "Connection lagged, resending snapshot");
                    SyncMetrics::record_resync();
                    match resync(&store, &mut sink).await {
                        Ok(fresh) => {
                            rx = fresh;
                            Ok(())
                        },
                        Err(e) => Err(e),
                    }
                },
                Err(RecvError::Closed) => break,
            };

            if outcome.is_err() {
                debug!(%origin, "Client went away");
                break;
            }
        }
    });

    let store = Arc::clone(&state.store);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        debug!(%origin, ?command, "Received command");
                        if let Err(e) = store.send(command.into_action(origin)).await {
                            warn!(%origin, error = %e, "Command not accepted");
                            break;
                        }
                    },
                    Err(e) => warn!(%origin, error = %e, "Ignoring malformed frame"),
                },
                Message::Binary(_) => warn!(%origin, "Ignoring binary frame"),
                Message::Ping(_) | Message::Pong(_) => {},
                Message::Close(_) => {
                    debug!(%origin, "Client requested close");
                    break;
                },
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
}
