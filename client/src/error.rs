//! Client errors.

use thiserror::Error;

/// Errors from the sync client
///
/// Transport faults after the first connection are not errors: they show up
/// as [`SyncStatus::Stale`](bakery_orders::SyncStatus::Stale) and the client
/// keeps reconnecting.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server could not be reached
    #[error("Failed to connect: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// The client has been shut down
    #[error("Sync client is closed")]
    Closed,

    /// The server sent a frame that is not a known event
    #[error("Malformed server frame: {0}")]
    Protocol(#[from] serde_json::Error),

    /// No snapshot arrived in time
    #[error("Timed out waiting for the server")]
    Timeout,
}

impl From<bakery_sync_runtime::StoreError> for ClientError {
    fn from(error: bakery_sync_runtime::StoreError) -> Self {
        match error {
            bakery_sync_runtime::StoreError::Timeout
            | bakery_sync_runtime::StoreError::ShutdownTimeout => Self::Timeout,
            bakery_sync_runtime::StoreError::ShutdownInProgress
            | bakery_sync_runtime::StoreError::ChannelClosed => Self::Closed,
        }
    }
}
