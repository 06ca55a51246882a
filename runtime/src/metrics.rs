//! Prometheus metrics for the order store and the sync channel.
//!
//! Metric names use dots; the Prometheus exporter renders them with
//! underscores (`store.commands.total` becomes `store_commands_total`).
//!
//! # Example
//!
//! ```rust,no_run
//! use bakery_sync_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // Serve `recorder.render()` from a `/metrics` route
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the global Prometheus recorder and renders its output.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create an uninstalled recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the bucket configuration is rejected
    /// and [`MetricsError::Install`] if installation fails for any reason other
    /// than a recorder already being installed in this process.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this recorder did not perform the installation.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Order store
    describe_counter!("store.commands.total", "Actions sent to the store");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside a single reduction"
    );
    describe_counter!(
        "store.broadcasts.total",
        "Broadcasts published to subscribers"
    );
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );

    // Sync channel
    describe_gauge!("sync.connections.active", "Open sync channel connections");
    describe_counter!(
        "sync.resyncs.total",
        "Snapshots resent to lagging or rejected connections"
    );
}

/// Sync channel metrics recorder.
pub struct SyncMetrics;

impl SyncMetrics {
    /// Record a newly accepted connection.
    pub fn connection_opened() {
        gauge!("sync.connections.active").increment(1.0);
    }

    /// Record a closed connection.
    pub fn connection_closed() {
        gauge!("sync.connections.active").decrement(1.0);
    }

    /// Record a snapshot resent to a single connection.
    pub fn record_resync() {
        counter!("sync.resyncs.total").increment(1);
    }
}
