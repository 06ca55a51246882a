//! Application state for Axum handlers.
//!
//! Holds the order store and the admin-editable catalogs next to it. The
//! state is cloned (cheaply via `Arc`) for each request and connection.

use crate::config::Config;
use axum::extract::FromRef;
use bakery_orders::{
    InMemoryPromoCatalog, OrderAction, OrderEnvironment, OrderStoreReducer, OrderStoreState,
    PromoCatalog, ShippingSettings,
};
use bakery_sync_core::environment::{RandomOrderIds, SystemClock};
use bakery_sync_runtime::metrics::MetricsRecorder;
use bakery_sync_runtime::Store;
use std::sync::Arc;

/// The server's authoritative order store
pub type OrderStore = Store<OrderStoreState, OrderAction, OrderEnvironment, OrderStoreReducer>;

/// Application state shared across all HTTP handlers and sync connections.
#[derive(Clone)]
pub struct AppState {
    /// Authoritative order store
    pub store: Arc<OrderStore>,
    /// Promo codes, shared with the store environment
    pub promos: Arc<dyn PromoCatalog>,
    /// Shipping fee rules, shared with the store environment
    pub shipping: Arc<ShippingSettings>,
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Prometheus recorder when metrics are enabled
    pub metrics: Option<Arc<MetricsRecorder>>,
}

impl AppState {
    /// State with an empty store, wall-clock time and random order ids
    #[must_use]
    pub fn new(config: Config) -> Self {
        let env = OrderEnvironment::new(
            Arc::new(SystemClock),
            Arc::new(RandomOrderIds),
            Arc::new(InMemoryPromoCatalog::new()),
            Arc::new(ShippingSettings::new(config.shipping)),
        );
        Self::with_environment(config, OrderStoreState::new(), env)
    }

    /// State over explicit initial orders and dependencies
    #[must_use]
    pub fn with_environment(config: Config, orders: OrderStoreState, env: OrderEnvironment) -> Self {
        let promos = Arc::clone(&env.promos);
        let shipping = Arc::clone(&env.shipping);
        let store = Store::with_broadcast_capacity(
            orders,
            OrderStoreReducer::with_options(config.store_options()),
            env,
            config.store.broadcast_capacity,
        );

        Self {
            store: Arc::new(store),
            promos,
            shipping,
            config: Arc::new(config),
            metrics: None,
        }
    }

    /// Attach an installed metrics recorder
    #[must_use]
    pub fn with_metrics(mut self, recorder: MetricsRecorder) -> Self {
        self.metrics = Some(Arc::new(recorder));
        self
    }
}

impl FromRef<AppState> for Arc<OrderStore> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn new_state_starts_empty() {
        let state = AppState::new(Config::default());
        state.shipping.update(
            bakery_orders::Money::from_major(40),
            bakery_orders::Money::from_major(500),
        );
        assert_eq!(state.shipping.get().cost, bakery_orders::Money::from_major(40));
        assert!(state.promos.list_promos().is_empty());
        assert!(state.store.state(OrderStoreState::is_empty).await);
    }
}
