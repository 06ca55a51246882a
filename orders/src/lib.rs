//! # Bakery Orders
//!
//! Domain model and business rules for Burger & Bakery order synchronization.
//!
//! - [`types`]: orders, line items, money and statuses
//! - [`promo`] and [`pricing`]: promo validation, discounts and shipping
//! - [`store`]: the authoritative order store reducer run by the server
//! - [`protocol`]: JSON frames exchanged over the sync channel
//! - [`reconciler`]: the per-client projection reducer
//!
//! ## Example
//!
//! ```ignore
//! use bakery_orders::store::{OrderAction, OrderStoreReducer, OrderStoreState};
//! use bakery_sync_runtime::Store;
//!
//! let store = Store::new(OrderStoreState::new(), OrderStoreReducer::new(), env);
//! store.send(OrderAction::PlaceOrder { origin, draft }).await?;
//! ```

pub mod pricing;
pub mod promo;
pub mod protocol;
pub mod reconciler;
pub mod store;
pub mod types;

pub use pricing::{price_order, PricingBreakdown, ShippingConfig, ShippingSettings};
pub use promo::{InMemoryPromoCatalog, PromoCatalog, PromoCode, PromoError, PromoValidation};
pub use protocol::{ClientCommand, ConnectionId, ServerEvent, StatusUpdate};
pub use reconciler::{Outbox, Projection, ProjectionAction, ProjectionReducer, SyncStatus};
pub use store::{
    OrderAction, OrderDraft, OrderEnvironment, OrderError, OrderStoreReducer, OrderStoreState,
    StatusPolicy, StoreOptions,
};
pub use types::{LineItem, Money, Order, OrderId, OrderStatus, ShippingDetails};
