//! Observability infrastructure: tracing and metrics.
//!
//! Binaries call [`init`] once at startup. Library code only emits through
//! `tracing` and the `metrics` macros.

use crate::config::ObservabilityConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Build the log filter: `RUST_LOG` wins, else the configured level.
fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Initialize the global observability infrastructure.
///
/// This must be called once at application startup before any other operations.
///
/// # Errors
/// Fails if a global subscriber is already set or the metrics listener
/// cannot be installed.
pub fn init(config: &ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .try_init()?;

    // Prometheus exporter is opt-in
    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new().with_http_listener(([0, 0, 0, 0], port)).install()?;
        tracing::info!("Prometheus metrics listening on port {}", port);
    }

    metrics::register_core_metrics();
    tracing::debug!("Observability initialized (log level: {})", config.log_level);

    Ok(())
}
