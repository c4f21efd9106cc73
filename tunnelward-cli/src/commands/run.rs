//! Run subcommand implementation
//!
//! Starts the subsystems in a fixed order, each one able to change the origin
//! URL the next one sees, then hands control to the supervisor until
//! shutdown.

use crate::config::{LogArgs, RunArgs};
use crate::subsystems::{dns_proxy, hello, metrics, ssh, updater};
use crate::{readiness, signals};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{debug, error, info, warn};
use tunnelward_common::{format_duration, DaemonConfig, SubsystemError};
use tunnelward_core::control::reconnect_channel;
use tunnelward_core::{
    BridgePlan, BridgeServer, ControlLoop, EdgeConnector, ReadinessSignal, ShutdownReport,
    SubsystemId, Supervisor,
};
use tunnelward_observability::{
    init_metrics, init_minimal_logging, init_tracing, shutdown_tracing, TracingConfig,
};

const HELLO_WORLD_BIND: &str = "127.0.0.1:0";
const UPDATE_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the daemon and return the process exit code.
pub async fn run(args: RunArgs) -> Result<i32> {
    init_logging(&args.log);

    let config = args.resolve().context("invalid configuration")?;
    if config.metrics.enabled {
        init_metrics();
    }

    info!("Starting tunnelward v{}", env!("CARGO_PKG_VERSION"));

    let supervisor = Supervisor::new(config.effective_grace_period());
    signals::spawn_forwarder(supervisor.trigger_handle());

    let report = start(Arc::new(config), supervisor).await;
    let code = match report.into_result() {
        Ok(()) => 0,
        Err(e) => {
            debug!(error = %e, "Exiting with failure");
            1
        }
    };

    shutdown_tracing();
    Ok(code)
}

fn init_logging(log: &LogArgs) {
    let config = TracingConfig {
        service_name: "tunnelward".to_string(),
        otlp_endpoint: log.otlp_endpoint.clone(),
        level: log.log_level.clone(),
        format: log.log_format,
    };
    if let Err(e) = init_tracing(config) {
        init_minimal_logging();
        warn!("Falling back to basic logging: {}", e);
    }
}

/// Bring every configured subsystem up in order and supervise until
/// shutdown. A subsystem that fails to start ends startup; everything
/// launched before it goes through the normal shutdown sequence.
pub async fn start(config: Arc<DaemonConfig>, mut supervisor: Supervisor) -> ShutdownReport {
    let ctx = supervisor.context();
    info!(
        connector_id = %ctx.connector_id,
        "Grace period is {}",
        format_duration(supervisor.grace_period())
    );

    let gate = if config.dns_proxy.enabled {
        let gate = ReadinessSignal::new();
        supervisor.launch(
            SubsystemId::DnsProxy,
            dns_proxy::run(config.dns_proxy.clone(), gate.clone(), ctx.clone()),
        );
        gate
    } else {
        ReadinessSignal::ready()
    };

    start_gated(config, supervisor, gate).await
}

/// Everything after the DNS proxy. Nothing here binds a socket before `gate`
/// opens.
async fn start_gated(
    config: Arc<DaemonConfig>,
    mut supervisor: Supervisor,
    gate: ReadinessSignal,
) -> ShutdownReport {
    let ctx = supervisor.context();
    if !supervisor.pass_gate(&gate).await {
        return supervisor.wait_to_shutdown().await;
    }

    if config.metrics.enabled {
        let bound = supervisor.listeners().bind(&config.metrics.bind).await;
        match bound {
            Ok(listener) => {
                supervisor.launch(SubsystemId::Metrics, metrics::run(listener, ctx.clone()));
            }
            Err(e) => {
                let error = SubsystemError::startup(format!(
                    "failed to bind metrics listener {}: {e}",
                    config.metrics.bind
                ));
                return abort_startup(supervisor, SubsystemId::Metrics, error).await;
            }
        }
    }

    readiness::spawn_consumers(&ctx, config.pidfile.clone());

    if config.dns_proxy_standalone() {
        info!("No hostname configured, running the DNS proxy only");
        ctx.connected.notify();
        return supervisor.wait_to_shutdown().await;
    }

    if let Some(url) = config
        .auto_update
        .url
        .clone()
        .filter(|_| config.auto_update.enabled())
    {
        match reqwest::Client::builder()
            .timeout(UPDATE_CHECK_TIMEOUT)
            .build()
        {
            Ok(client) => supervisor.launch(
                SubsystemId::AutoUpdater,
                updater::run(url, config.auto_update.freq, client, ctx.clone()),
            ),
            Err(e) => {
                let error = SubsystemError::startup(format!("failed to build update client: {e}"));
                return abort_startup(supervisor, SubsystemId::AutoUpdater, error).await;
            }
        }
    }

    let mut origin_url = config.url.clone();

    if config.hello_world {
        let bound = supervisor
            .listeners()
            .bind(HELLO_WORLD_BIND)
            .await
            .and_then(|listener| Ok((listener.local_addr()?, listener)));
        match bound {
            Ok((addr, listener)) => {
                origin_url = format!("http://{addr}");
                supervisor.launch(SubsystemId::HelloWorld, hello::run(listener, ctx.clone()));
            }
            Err(e) => {
                let error =
                    SubsystemError::startup(format!("failed to bind hello world server: {e}"));
                return abort_startup(supervisor, SubsystemId::HelloWorld, error).await;
            }
        }
    }

    if config.ssh_server.enabled {
        origin_url = ssh::origin_url(&config.ssh_server);
        supervisor.launch(
            SubsystemId::SshServer,
            ssh::run(config.ssh_server.clone(), ctx.clone()),
        );
    }

    if let Err(e) = config.check_origin(&origin_url) {
        error!("{}", e);
        let error = SubsystemError::startup(e.to_string());
        return abort_startup(supervisor, SubsystemId::Transport, error).await;
    }

    if let Some(plan) = BridgePlan::dispatch(
        &origin_url,
        config.bridge.bastion,
        config.bridge.socks5,
        config.ssh_server.enabled,
    ) {
        let bind = config.bridge.bind_addr();
        let bound = supervisor.listeners().bind(&bind).await;
        let server = match bound {
            Ok(listener) => BridgeServer::new(listener, plan),
            Err(e) => {
                let error =
                    SubsystemError::startup(format!("failed to bind bridge listener {bind}: {e}"));
                return abort_startup(supervisor, SubsystemId::Bridge, error).await;
            }
        };
        match server.local_addr() {
            Ok(addr) => origin_url = format!("http://{addr}"),
            Err(e) => return abort_startup(supervisor, SubsystemId::Bridge, e.into()).await,
        }
        supervisor.launch(SubsystemId::Bridge, server.run(ctx.clone()));
    }

    let (reconnect_tx, reconnect_rx) = reconnect_channel();
    if config.stdin_control {
        info!("Reading control commands from stdin");
        let control = ControlLoop::new(
            BufReader::new(tokio::io::stdin()),
            reconnect_tx,
            ctx.shutdown.clone(),
        );
        tokio::spawn(control.run());
    }

    match &config.hostname {
        Some(hostname) => info!("Serving {} from {}", hostname, origin_url),
        None => info!("Tunnel origin is {}", origin_url),
    }

    match EdgeConnector::new(&config.transport, &origin_url) {
        Ok(connector) => {
            supervisor.launch(SubsystemId::Transport, connector.run(ctx, reconnect_rx));
        }
        Err(e) => supervisor.record_startup_failure(SubsystemId::Transport, e),
    }

    supervisor.wait_to_shutdown().await
}

async fn abort_startup(
    mut supervisor: Supervisor,
    id: SubsystemId,
    error: SubsystemError,
) -> ShutdownReport {
    supervisor.record_startup_failure(id, error);
    supervisor.wait_to_shutdown().await
}
