//! # Bakery Sync Runtime
//!
//! The `Store` runtime that coordinates reducer execution, ordered
//! broadcasting and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: owns state behind a lock and runs one reduction at a time
//! - **Broadcast**: `Effect::Broadcast` payloads are published to every
//!   subscriber while the reduction's write lock is held
//! - **Shutdown**: new actions are refused, the reduction in flight finishes
//!
//! ## Example
//!
//! ```ignore
//! use bakery_sync_runtime::Store;
//!
//! let store = Store::new(OrderStoreState::default(), OrderStoreReducer::new(), env);
//!
//! // Snapshot and subscribe without missing or duplicating a broadcast
//! let (snapshot, mut rx) = store.subscribe_with(|s| s.orders_newest_first()).await;
//!
//! store.send(OrderAction::DeleteOrder { origin, order_id }).await?;
//! ```

use bakery_sync_core::{effect::Effect, reducer::Reducer};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Exponential backoff policy shared by reconnecting clients
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for the action being reduced
        #[error("Shutdown timed out waiting for an in-flight action")]
        ShutdownTimeout,

        /// Timeout waiting for a matching broadcast
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but experiencing issues
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    pub message: Option<String>,

    /// Optional metadata (subscriber counts)
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Store module - the runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, Duration, Effect, HealthCheck, Ordering, Reducer, RwLock, StoreError,
    };
    use tokio::sync::broadcast;

    /// Default number of buffered broadcasts per subscriber.
    pub const DEFAULT_BROADCAST_CAPACITY: usize = 16;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; one reduction holds the write lock at a time)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Broadcast of `Effect::Broadcast` payloads to subscribers
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Clone + Send + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with the default broadcast capacity
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(
                initial_state,
                reducer,
                environment,
                DEFAULT_BROADCAST_CAPACITY,
            )
        }

        /// Create a new store with a custom broadcast capacity
        ///
        /// Each subscriber may fall this many broadcasts behind before it
        /// starts observing `RecvError::Lagged`.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                action_broadcast,
            }
        }

        /// Send an action through the reducer
        ///
        /// The reduction runs under the state write lock and its broadcasts
        /// are published before the lock is released.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                ::metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            ::metrics::counter!("store.commands.total").increment(1);

            let mut state = self.state.write().await;

            let start = std::time::Instant::now();
            let effects = self.reducer.reduce(&mut state, action, &self.environment);
            ::metrics::histogram!("store.reducer.duration_seconds")
                .record(start.elapsed().as_secs_f64());

            tracing::trace!("Reducer completed, returned {} effects", effects.len());

            for effect in effects {
                match effect {
                    Effect::None => {},
                    Effect::Broadcast(action) => self.publish(action),
                }
            }
            Ok(())
        }

        /// Send an action and wait for a matching broadcast
        ///
        /// Subscribes before sending, so a broadcast produced by this very
        /// action cannot be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching broadcast before the timeout
        /// - [`StoreError::ChannelClosed`]: broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to every broadcast from this store
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read state and subscribe in one step
        ///
        /// Broadcasts are published under the write lock, so holding the read
        /// lock while subscribing guarantees the returned receiver sees
        /// exactly the broadcasts that happen after the returned snapshot.
        pub async fn subscribe_with<F, T>(&self, f: F) -> (T, broadcast::Receiver<A>)
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            let rx = self.action_broadcast.subscribe();
            (f(&state), rx)
        }

        /// Read current state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Number of live broadcast subscribers
        #[must_use]
        pub fn subscriber_count(&self) -> usize {
            self.action_broadcast.receiver_count()
        }

        /// Perform a health check on the Store
        #[must_use]
        pub fn health(&self) -> HealthCheck {
            let check = if self.shutdown.load(Ordering::Acquire) {
                HealthCheck::unhealthy("store", "Store is shutting down")
            } else {
                HealthCheck::healthy("store")
            };

            check.with_metadata("subscribers", self.subscriber_count().to_string())
        }

        /// Stop accepting actions and wait for the reduction in flight
        ///
        /// The state lock is fair, so once it is acquired every action
        /// accepted before shutdown has been reduced and broadcast.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if a reduction is still
        /// running when the timeout elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            self.shutdown.store(true, Ordering::Release);
            tracing::info!("Store shutdown initiated");

            match tokio::time::timeout(timeout, self.state.write()).await {
                Ok(_drained) => {
                    tracing::info!("Store shutdown complete");
                    Ok(())
                },
                Err(_) => {
                    tracing::warn!("Store shutdown timed out");
                    Err(StoreError::ShutdownTimeout)
                },
            }
        }

        fn publish(&self, action: A) {
            ::metrics::counter!("store.broadcasts.total").increment(1);
            match self.action_broadcast.send(action) {
                Ok(receivers) => tracing::trace!(receivers, "Broadcast published"),
                Err(_) => tracing::trace!("Broadcast published with no subscribers"),
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use bakery_sync_core::{smallvec, SmallVec};

    #[derive(Debug, Clone, Default)]
    struct TestState {
        value: i32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        Announce,
        Announced(i32),
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Announce => {
                    state.value += 1;
                    smallvec![Effect::Broadcast(TestAction::Announced(state.value))]
                },
                TestAction::Announced(_) => smallvec![Effect::None],
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState::default(), TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn send_updates_state() {
        let store = store();
        store.send(TestAction::Increment).await.unwrap();
        store.send(TestAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 2);
    }

    #[tokio::test]
    async fn broadcasts_arrive_in_reduction_order() {
        let store = store();
        let mut rx = store.subscribe_actions();

        for _ in 0..5 {
            store.send(TestAction::Announce).await.unwrap();
        }

        for expected in 1..=5 {
            assert_eq!(rx.recv().await.unwrap(), TestAction::Announced(expected));
        }
    }

    #[tokio::test]
    async fn concurrent_senders_still_broadcast_in_state_order() {
        let store = store();
        let mut rx = store.subscribe_actions();

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.send(TestAction::Announce).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for expected in 1..=10 {
            assert_eq!(rx.recv().await.unwrap(), TestAction::Announced(expected));
        }
    }

    #[tokio::test]
    async fn non_broadcast_actions_are_not_published() {
        let store = store();
        let mut rx = store.subscribe_actions();

        store.send(TestAction::Increment).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribe_with_pairs_snapshot_and_stream() {
        let store = store();
        store.send(TestAction::Announce).await.unwrap();

        let (snapshot, mut rx) = store.subscribe_with(|s| s.value).await;
        assert_eq!(snapshot, 1);

        store.send(TestAction::Announce).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), TestAction::Announced(2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_and_wait_for_returns_matching_broadcast() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TestAction::Announce,
                |a| matches!(a, TestAction::Announced(_)),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(result, TestAction::Announced(1));
    }

    #[tokio::test]
    async fn send_and_wait_for_times_out() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TestAction::Increment,
                |a| matches!(a, TestAction::Announced(_)),
                Duration::from_millis(20),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = store.send(TestAction::Increment).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        assert_eq!(store.health().status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn health_reports_subscribers() {
        let store = store();
        let _rx = store.subscribe_actions();
        let health = store.health();

        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health
            .metadata
            .contains(&("subscribers".to_string(), "1".to_string())));
    }
}
