pub mod metrics;
pub mod tracing;

#[cfg(feature = "axum")]
pub mod server;

pub use metrics::{
    gather_metrics, init_metrics, metrics_enabled, tunnel_metrics, TunnelMetrics, REGISTRY,
};
#[cfg(feature = "axum")]
pub use server::{serve_metrics, ReadyCheck};
pub use tracing::{init_tracing, shutdown_tracing, LogFormat, TracingConfig};

/// Minimal logging setup without metrics or OpenTelemetry infrastructure
pub fn init_minimal_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
