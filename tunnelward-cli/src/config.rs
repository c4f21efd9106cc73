//! `run` flags and configuration resolution.
//!
//! Every setting can come from a flag (or its `TUNNELWARD_*` variable), the
//! TOML file named by `--config`, or the built-in default, in that order.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tunnelward_common::{parse_duration, DaemonConfig};
use tunnelward_observability::LogFormat;

/// Logging and telemetry flags. These are read before any config file.
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log filter directive (`info`, `tunnelward_core=debug`); `RUST_LOG` wins
    #[arg(long, env = "TUNNELWARD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log line format: text or json
    #[arg(long, default_value = "text", env = "TUNNELWARD_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Export spans to this OTLP endpoint
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

/// Local services started next to the tunnel
#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServiceArgs {
    /// Run the DNS-over-HTTPS proxy
    #[arg(long, env = "TUNNELWARD_PROXY_DNS")]
    pub proxy_dns: bool,

    /// DNS proxy listen address
    #[arg(long, env = "TUNNELWARD_PROXY_DNS_ADDRESS")]
    pub proxy_dns_address: Option<String>,

    /// DNS proxy listen port
    #[arg(long, env = "TUNNELWARD_PROXY_DNS_PORT")]
    pub proxy_dns_port: Option<u16>,

    /// DNS-over-HTTPS upstream, tried in the order given
    #[arg(long, env = "TUNNELWARD_PROXY_DNS_UPSTREAM", value_delimiter = ',')]
    pub proxy_dns_upstream: Vec<String>,

    /// Serve a greeting on a loopback port and tunnel to it
    #[arg(long, env = "TUNNELWARD_HELLO_WORLD")]
    pub hello_world: bool,

    /// Run a local sshd and tunnel to it (Unix only)
    #[arg(long, env = "TUNNELWARD_SSH_SERVER")]
    pub ssh_server: bool,

    /// Port of the local sshd
    #[arg(long, env = "TUNNELWARD_LOCAL_SSH_PORT")]
    pub local_ssh_port: Option<u16>,

    /// sshd binary
    #[arg(long, env = "TUNNELWARD_SSHD_PATH")]
    pub sshd_path: Option<PathBuf>,

    /// Host key handed to sshd
    #[arg(long, env = "TUNNELWARD_HOST_KEY_PATH")]
    pub host_key_path: Option<PathBuf>,

    /// Answer bridged connections with a SOCKS5 handshake
    #[arg(long, env = "TUNNELWARD_SOCKS5")]
    pub socks5: bool,

    /// Take each bridged connection's destination from its jump header
    #[arg(long, env = "TUNNELWARD_BASTION")]
    pub bastion: bool,

    /// Bridge listener address
    #[arg(long, env = "TUNNELWARD_PROXY_ADDRESS")]
    pub proxy_address: Option<String>,

    /// Bridge listener port (0 picks a free one)
    #[arg(long, env = "TUNNELWARD_PROXY_PORT")]
    pub proxy_port: Option<u16>,

    /// Check this URL for newer releases
    #[arg(long, env = "TUNNELWARD_UPDATE_URL")]
    pub update_url: Option<String>,

    /// How often to check for releases (`0` disables)
    #[arg(long, env = "TUNNELWARD_AUTOUPDATE_FREQ", value_parser = parse_duration)]
    pub autoupdate_freq: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML configuration file
    #[arg(long, env = "TUNNELWARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Origin URL the tunnel forwards to
    #[arg(long, env = "TUNNELWARD_URL")]
    pub url: Option<String>,

    /// Public hostname served by the tunnel
    #[arg(long, env = "TUNNELWARD_HOSTNAME")]
    pub hostname: Option<String>,

    /// Time to keep serving after the first shutdown signal (`30s`, `1m`, `0`)
    #[arg(long, env = "TUNNELWARD_GRACE_PERIOD", value_parser = parse_duration)]
    pub grace_period: Option<Duration>,

    /// Metrics listen address (`host:port`)
    #[arg(long, env = "TUNNELWARD_METRICS")]
    pub metrics: Option<String>,

    /// Serve and record metrics
    #[arg(long, env = "TUNNELWARD_METRICS_ENABLED", value_name = "BOOL")]
    pub metrics_enabled: Option<bool>,

    /// Write the process id here once the tunnel is connected
    #[arg(long, env = "TUNNELWARD_PIDFILE")]
    pub pidfile: Option<PathBuf>,

    /// Edge address (`host:port`); repeat for more
    #[arg(long, env = "TUNNELWARD_EDGE", value_delimiter = ',')]
    pub edge: Vec<String>,

    /// Concurrent edge connections
    #[arg(long, env = "TUNNELWARD_HA_CONNECTIONS")]
    pub ha_connections: Option<u8>,

    /// Consecutive dial failures tolerated per edge connection
    #[arg(long, env = "TUNNELWARD_RETRIES")]
    pub retries: Option<u32>,

    /// Read `reconnect [delay]` commands from stdin
    #[arg(long, env = "TUNNELWARD_STDIN_CONTROL")]
    pub stdin_control: bool,

    #[command(flatten)]
    pub services: ServiceArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl RunArgs {
    /// Build the validated configuration snapshot for this run.
    pub fn resolve(&self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => load_file(path)?,
            None => DaemonConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Overlay every flag that was given onto `config`.
    pub fn apply(&self, config: &mut DaemonConfig) {
        if let Some(url) = &self.url {
            config.url.clone_from(url);
        }
        if self.hostname.is_some() {
            config.hostname.clone_from(&self.hostname);
        }
        if let Some(grace) = self.grace_period {
            config.grace_period = grace;
        }
        if let Some(bind) = &self.metrics {
            config.metrics.bind.clone_from(bind);
        }
        if let Some(enabled) = self.metrics_enabled {
            config.metrics.enabled = enabled;
        }
        if self.pidfile.is_some() {
            config.pidfile.clone_from(&self.pidfile);
        }
        if !self.edge.is_empty() {
            config.transport.edge.clone_from(&self.edge);
        }
        if let Some(ha) = self.ha_connections {
            config.transport.ha_connections = ha;
        }
        if let Some(retries) = self.retries {
            config.transport.retries = retries;
        }
        config.stdin_control |= self.stdin_control;

        let s = &self.services;
        config.dns_proxy.enabled |= s.proxy_dns;
        if let Some(address) = &s.proxy_dns_address {
            config.dns_proxy.address.clone_from(address);
        }
        if let Some(port) = s.proxy_dns_port {
            config.dns_proxy.port = port;
        }
        if !s.proxy_dns_upstream.is_empty() {
            config.dns_proxy.upstreams.clone_from(&s.proxy_dns_upstream);
        }

        config.hello_world |= s.hello_world;

        config.ssh_server.enabled |= s.ssh_server;
        if let Some(port) = s.local_ssh_port {
            config.ssh_server.local_port = port;
        }
        if let Some(path) = &s.sshd_path {
            config.ssh_server.sshd_path.clone_from(path);
        }
        if s.host_key_path.is_some() {
            config.ssh_server.host_key_path.clone_from(&s.host_key_path);
        }

        config.bridge.socks5 |= s.socks5;
        config.bridge.bastion |= s.bastion;
        if let Some(address) = &s.proxy_address {
            config.bridge.address.clone_from(address);
        }
        if let Some(port) = s.proxy_port {
            config.bridge.port = port;
        }

        if s.update_url.is_some() {
            config.auto_update.url.clone_from(&s.update_url);
        }
        if let Some(freq) = s.autoupdate_freq {
            config.auto_update.freq = freq;
        }
    }
}

fn load_file(path: &Path) -> Result<DaemonConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
}
