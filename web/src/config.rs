//! Configuration management for the sync server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unparseable values fall back to the default and are logged.

use bakery_orders::{Money, ShippingConfig, StatusPolicy, StoreOptions};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Whether a connection receives broadcasts caused by its own commands
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfEcho {
    /// The issuer already applied the mutation optimistically
    #[default]
    Skip,
    /// Everyone, issuer included, receives every event
    Deliver,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Order store configuration
    pub store: StoreConfig,
    /// Sync channel configuration
    pub sync: SyncConfig,
    /// Initial shipping fee rules
    pub shipping: ShippingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Order store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Persist hides on the order record
    pub durable_hide: bool,
    /// Enforce the status transition table
    pub strict_transitions: bool,
    /// Broadcasts a connection may fall behind before it is resynchronized
    pub broadcast_capacity: usize,
    /// How long checkout waits for the store, in milliseconds
    pub checkout_timeout_ms: u64,
}

/// Sync channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Self-echo policy
    pub self_echo: SelfEcho,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let self_echo = if parse_or(&lookup, "SELF_ECHO", false) {
            SelfEcho::Deliver
        } else {
            SelfEcho::Skip
        };

        Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 3001),
                metrics_enabled: parse_or(&lookup, "METRICS_ENABLED", false),
                shutdown_timeout: parse_or(&lookup, "SHUTDOWN_TIMEOUT", 10),
            },
            store: StoreConfig {
                durable_hide: parse_or(&lookup, "DURABLE_HIDE", false),
                strict_transitions: parse_or(&lookup, "STRICT_TRANSITIONS", false),
                broadcast_capacity: parse_or(&lookup, "BROADCAST_CAPACITY", 256),
                checkout_timeout_ms: parse_or(&lookup, "CHECKOUT_TIMEOUT_MS", 5_000),
            },
            sync: SyncConfig { self_echo },
            shipping: ShippingConfig::new(
                Money::from_decimal(parse_or(&lookup, "SHIPPING_COST", 0.0)),
                Money::from_decimal(parse_or(&lookup, "SHIPPING_THRESHOLD", 0.0)),
            ),
        }
    }

    /// Address to bind, `host:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Store options derived from the flags
    #[must_use]
    pub const fn store_options(&self) -> StoreOptions {
        StoreOptions {
            durable: self.store.durable_hide,
            policy: if self.store.strict_transitions {
                StatusPolicy::Strict
            } else {
                StatusPolicy::Permissive
            },
        }
    }

    /// Checkout wait
    #[must_use]
    pub const fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.store.checkout_timeout_ms)
    }

    /// Graceful shutdown wait
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
    }
}
