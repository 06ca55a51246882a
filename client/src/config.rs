//! Client configuration.

use bakery_sync_runtime::retry::RetryPolicy;
use std::time::Duration;

/// Default sync endpoint of a local server
pub const DEFAULT_URL: &str = "ws://localhost:3001/ws";

/// How a [`SyncClient`](crate::SyncClient) reaches the server
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the sync channel
    pub url: String,
    /// Forward hides to a server that persists them
    pub durable: bool,
    /// Backoff between connection attempts
    pub reconnect: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ClientConfig {
    /// Client for `url` with default reconnect behavior
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load from `BACKEND_URL` and `DURABLE_HIDE`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("BACKEND_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let durable = lookup("DURABLE_HIDE").is_some_and(|v| matches!(v.trim(), "1" | "true"));

        Self {
            url,
            durable,
            reconnect: RetryPolicy::builder()
                .max_retries(10)
                .initial_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(5))
                .multiplier(2.0)
                .build(),
        }
    }

    /// Use `durable` hides
    #[must_use]
    pub const fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Replace the reconnect policy
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: RetryPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_a_local_server() {
        let config = ClientConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert!(!config.durable);
        assert_eq!(config.reconnect.max_retries, 10);
    }

    #[test]
    fn reads_backend_url_and_durability() {
        let config = ClientConfig::from_lookup(|key| match key {
            "BACKEND_URL" => Some("ws://orders.internal:8080/ws".into()),
            "DURABLE_HIDE" => Some("true".into()),
            _ => None,
        });
        assert_eq!(config.url, "ws://orders.internal:8080/ws");
        assert!(config.durable);
    }

    #[test]
    fn blank_url_falls_back() {
        let config = ClientConfig::from_lookup(|_| Some("  ".into()));
        assert_eq!(config.url, DEFAULT_URL);
        assert!(!config.durable);
    }
}
