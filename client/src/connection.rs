//! Background connection task.
//!
//! ```text
//!        ┌────────────┐  connect ok   ┌──────────┐ initialOrders ┌──────┐
//!  ───> │ Connecting │ ────────────> │ session  │ ────────────> │ Live │
//!        └────────────┘               └──────────┘               └──────┘
//!              ^                                                    │
//!              │            backoff, then reconnect                 │ socket lost
//!              └──────────────────── Stale <────────────────────────┘
//! ```
//!
//! Commands leave through the [`Outbox`] attached for the current socket.
//! Nothing is queued across connections; the next snapshot replaces whatever
//! the projection held.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::ProjectionStore;
use bakery_orders::{Outbox, ProjectionAction, ServerEvent};
use bakery_sync_runtime::retry::retry_with_backoff;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a session ended
enum End {
    Stopped,
    Lost(String),
}

/// Parse a text frame from the server
///
/// # Errors
///
/// [`ClientError::Protocol`] if the frame is not a known event.
pub fn decode(text: &str) -> Result<ServerEvent, ClientError> {
    Ok(serde_json::from_str(text)?)
}

async fn connect(url: &str) -> Result<Socket, ClientError> {
    let (socket, _) = connect_async(url).await?;
    Ok(socket)
}

/// Keep the projection connected until `stop` fires or its sender is dropped
pub(crate) async fn run(
    config: ClientConfig,
    store: Arc<ProjectionStore>,
    outbox: Arc<Outbox>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let stopped = *stop.borrow();
        if stopped || store.send(ProjectionAction::Connecting).await.is_err() {
            break;
        }

        let attempt = retry_with_backoff(&config.reconnect, || connect(&config.url));
        let connected = tokio::select! {
            result = attempt => result,
            _ = stop.changed() => break,
        };

        match connected {
            Ok(socket) => {
                info!(url = %config.url, "Connected to sync server");
                let end = session(socket, &store, &outbox, &mut stop).await;
                outbox.detach();
                match end {
                    End::Stopped => break,
                    End::Lost(reason) => {
                        warn!(%reason, "Sync connection lost");
                        if store.send(ProjectionAction::TransportLost).await.is_err() {
                            break;
                        }
                    },
                }
            },
            Err(error) => {
                warn!(%error, url = %config.url, "Sync server unreachable, backing off");
                if store.send(ProjectionAction::TransportLost).await.is_err() {
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(config.reconnect.max_delay) => {},
                    _ = stop.changed() => break,
                }
            },
        }
    }

    outbox.detach();
    debug!("Connection task finished");
}

async fn session(
    socket: Socket,
    store: &ProjectionStore,
    outbox: &Outbox,
    stop: &mut watch::Receiver<bool>,
) -> End {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut commands) = mpsc::unbounded_channel();
    outbox.attach(tx);

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode(&text) {
                    Ok(event) => {
                        debug!(event = event.name(), "Received event");
                        if store.send(ProjectionAction::Inbound(event)).await.is_err() {
                            return End::Stopped;
                        }
                    },
                    Err(error) => warn!(%error, "Ignoring frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return End::Lost("server closed the connection".to_string());
                },
                Some(Ok(_)) => {},
                Some(Err(error)) => return End::Lost(error.to_string()),
            },
            Some(command) = commands.recv() => {
                let json = match serde_json::to_string(&command) {
                    Ok(json) => json,
                    Err(error) => {
                        warn!(%error, "Failed to serialize command");
                        continue;
                    },
                };
                debug!(?command, "Sending command");
                if let Err(error) = sink.send(Message::Text(json)).await {
                    return End::Lost(error.to_string());
                }
            },
            _ = stop.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return End::Stopped;
            },
        }
    }
}
