//! WebSocket client for Burger & Bakery order sync.
//!
//! A [`SyncClient`] keeps a local [`Projection`] of the server's orders. Local
//! mutations are applied immediately and forwarded while the connection is
//! live; server events are merged as they arrive. When the socket drops the
//! projection goes [`SyncStatus::Stale`] and the client reconnects with
//! exponential backoff, replacing its state with the next snapshot.
//!
//! # Example
//!
//! ```ignore
//! use bakery_sync_client::{ClientConfig, SyncClient};
//!
//! let client = SyncClient::connect(ClientConfig::from_env());
//! client.wait_until_live(Duration::from_secs(5)).await?;
//! client.update_status(order_id, OrderStatus::Baked).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod error;

pub use config::ClientConfig;
pub use error::ClientError;

use bakery_orders::reconciler::ProjectionEnvironment;
use bakery_orders::{
    Order, OrderId, OrderStatus, Outbox, Projection, ProjectionAction, ProjectionReducer,
    SyncStatus,
};
use bakery_sync_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// The local projection store driven by a [`SyncClient`]
pub type ProjectionStore =
    Store<Projection, ProjectionAction, ProjectionEnvironment, ProjectionReducer>;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Connected, optimistic view of the order store
pub struct SyncClient {
    store: Arc<ProjectionStore>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncClient {
    /// Start connecting in the background
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(config: ClientConfig) -> Self {
        let outbox = Arc::new(Outbox::new());
        let reducer = if config.durable {
            ProjectionReducer::durable()
        } else {
            ProjectionReducer::new()
        };
        let store = Arc::new(Store::new(
            Projection::new(),
            reducer,
            ProjectionEnvironment::new(Arc::clone(&outbox)),
        ));

        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(connection::run(config, Arc::clone(&store), outbox, stopped));

        Self { store, stop, task }
    }

    /// Wait for the first (or next) snapshot
    ///
    /// # Errors
    ///
    /// [`ClientError::Timeout`] if the projection is not live in time,
    /// [`ClientError::Closed`] if the client shut down meanwhile.
    pub async fn wait_until_live(&self, timeout: Duration) -> Result<(), ClientError> {
        self.wait_for_status(SyncStatus::Live, timeout).await
    }

    /// Wait until the projection reaches `target`
    ///
    /// # Errors
    ///
    /// See [`SyncClient::wait_until_live`].
    pub async fn wait_for_status(
        &self,
        target: SyncStatus,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let (current, mut rx) = self.store.subscribe_with(Projection::status).await;
        if current == target {
            return Ok(());
        }

        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(ProjectionAction::StatusChanged(status)) if status == target => {
                        return Ok(());
                    },
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
                    Err(broadcast::error::RecvError::Closed) => return Err(ClientError::Closed),
                }
            }
        })
        .await
        .map_err(|_| ClientError::Timeout)?
    }

    /// Place an order built on this client
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] after [`SyncClient::shutdown`].
    pub async fn place_order(&self, order: Order) -> Result<(), ClientError> {
        self.store.send(ProjectionAction::PlaceOrder(order)).await?;
        Ok(())
    }

    /// Change an order's status
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] after [`SyncClient::shutdown`].
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), ClientError> {
        self.store
            .send(ProjectionAction::UpdateStatus { order_id, status })
            .await?;
        Ok(())
    }

    /// Delete an order
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] after [`SyncClient::shutdown`].
    pub async fn delete_order(&self, order_id: OrderId) -> Result<(), ClientError> {
        self.store.send(ProjectionAction::DeleteOrder(order_id)).await?;
        Ok(())
    }

    /// Hide an order from this client's lists
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] after [`SyncClient::shutdown`].
    pub async fn hide_order(&self, order_id: OrderId) -> Result<(), ClientError> {
        self.store.send(ProjectionAction::HideOrder(order_id)).await?;
        Ok(())
    }

    /// Visible orders, newest first
    pub async fn orders(&self) -> Vec<Order> {
        self.store
            .state(|p| p.visible_orders().cloned().collect())
            .await
    }

    /// One order, hidden or not
    pub async fn order(&self, order_id: OrderId) -> Option<Order> {
        self.store.state(|p| p.get(order_id).cloned()).await
    }

    /// Current connection state
    pub async fn status(&self) -> SyncStatus {
        self.store.state(Projection::status).await
    }

    /// Every change applied to the projection
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProjectionAction> {
        self.store.subscribe_actions()
    }

    /// Close the connection and stop the projection store
    ///
    /// # Errors
    ///
    /// [`ClientError::Timeout`] if the store does not drain in time.
    pub async fn shutdown(self) -> Result<(), ClientError> {
        let _ = self.stop.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!(%error, "Connection task ended abnormally");
        }
        self.store.shutdown(SHUTDOWN_TIMEOUT).await?;
        Ok(())
    }
}
