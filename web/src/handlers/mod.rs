//! HTTP and WebSocket handlers.
//!
//! This module contains all handlers organized by resource.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod promos;
pub mod shipping;
pub mod sync;

pub use health::{health_check, readiness_check};
