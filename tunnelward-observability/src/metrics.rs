//! Prometheus metrics for the supervisor and its subsystems.
//!
//! Metrics are registered lazily; recording sites go through
//! [`tunnel_metrics`], which returns `None` until [`init_metrics`] ran.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    Registry::new_custom(Some("tunnelward".to_string()), None).unwrap_or_default()
});

static METRICS_ENABLED: AtomicBool = AtomicBool::new(false);

static TUNNEL_METRICS: LazyLock<Option<TunnelMetrics>> = LazyLock::new(|| {
    TunnelMetrics::register()
        .inspect_err(|e| tracing::error!("Failed to register metrics: {}", e))
        .ok()
});

pub struct TunnelMetrics {
    subsystems_running: IntGauge,
    subsystem_exits: IntCounterVec,
    shutdown_phase: IntGauge,
    bridge_connections: IntCounterVec,
    reconnect_requests: IntCounter,
    edge_connections: IntGauge,
}

impl TunnelMetrics {
    fn register() -> prometheus::Result<Self> {
        let metrics = Self {
            subsystems_running: IntGauge::new(
                "subsystems_running",
                "Supervised subsystems currently running",
            )?,
            subsystem_exits: IntCounterVec::new(
                Opts::new("subsystem_exits_total", "Subsystem exits by result"),
                &["subsystem", "result"],
            )?,
            shutdown_phase: IntGauge::new(
                "shutdown_phase",
                "0 running, 1 graceful drain, 2 forced stop",
            )?,
            bridge_connections: IntCounterVec::new(
                Opts::new("bridge_connections_total", "Bridged connections by handler"),
                &["handler"],
            )?,
            reconnect_requests: IntCounter::new(
                "reconnect_requests_total",
                "Reconnect requests issued by the operator",
            )?,
            edge_connections: IntGauge::new("edge_connections", "Open edge connections")?,
        };

        REGISTRY.register(Box::new(metrics.subsystems_running.clone()))?;
        REGISTRY.register(Box::new(metrics.subsystem_exits.clone()))?;
        REGISTRY.register(Box::new(metrics.shutdown_phase.clone()))?;
        REGISTRY.register(Box::new(metrics.bridge_connections.clone()))?;
        REGISTRY.register(Box::new(metrics.reconnect_requests.clone()))?;
        REGISTRY.register(Box::new(metrics.edge_connections.clone()))?;

        Ok(metrics)
    }

    pub fn subsystem_started(&self) {
        self.subsystems_running.inc();
    }

    pub fn subsystem_exited(&self, subsystem: &str, failed: bool) {
        self.subsystems_running.dec();
        let result = if failed { "error" } else { "ok" };
        self.subsystem_exits
            .with_label_values(&[subsystem, result])
            .inc();
    }

    pub fn set_shutdown_phase(&self, phase: i64) {
        self.shutdown_phase.set(phase);
    }

    pub fn bridge_connection(&self, handler: &str) {
        self.bridge_connections.with_label_values(&[handler]).inc();
    }

    pub fn reconnect_requested(&self) {
        self.reconnect_requests.inc();
    }

    pub fn edge_connection_opened(&self) {
        self.edge_connections.inc();
    }

    pub fn edge_connection_closed(&self) {
        self.edge_connections.dec();
    }
}

/// Register all metrics and start recording. Safe to call more than once.
pub fn init_metrics() {
    if METRICS_ENABLED.swap(true, Ordering::SeqCst) {
        return;
    }

    #[cfg(target_os = "linux")]
    {
        let process = prometheus::process_collector::ProcessCollector::for_self();
        if let Err(e) = REGISTRY.register(Box::new(process)) {
            tracing::debug!("Process metrics unavailable: {}", e);
        }
    }

    LazyLock::force(&TUNNEL_METRICS);
}

pub fn metrics_enabled() -> bool {
    METRICS_ENABLED.load(Ordering::Relaxed)
}

pub fn tunnel_metrics() -> Option<&'static TunnelMetrics> {
    if metrics_enabled() {
        TUNNEL_METRICS.as_ref()
    } else {
        None
    }
}

/// Prometheus text exposition of everything in [`REGISTRY`].
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
