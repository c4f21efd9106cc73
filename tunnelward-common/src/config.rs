//! Resolved daemon configuration.
//!
//! A `DaemonConfig` is assembled once at startup (flags over config file over
//! defaults), validated, and then shared read-only with every subsystem.

use crate::constants::{
    DEFAULT_AUTOUPDATE_FREQ, DEFAULT_BRIDGE_ADDRESS, DEFAULT_BRIDGE_PORT, DEFAULT_DNS_ADDRESS,
    DEFAULT_DNS_PORT, DEFAULT_DNS_UPSTREAMS, DEFAULT_GRACE_PERIOD, DEFAULT_HA_CONNECTIONS,
    DEFAULT_LOCAL_SSH_PORT, DEFAULT_METRICS_BIND, DEFAULT_ORIGIN_URL, DEFAULT_RETRIES,
    DEFAULT_SSHD_PATH,
};
use crate::duration;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct MetricsConfig {
    /// Serve `/metrics`, `/healthcheck` and `/ready`
    pub enabled: bool,
    /// Listen address (`host:port`, port 0 picks a free one)
    pub bind: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: DEFAULT_METRICS_BIND.to_string(),
        }
    }
}

/// DNS-over-HTTPS proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DnsProxyConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    /// DoH endpoints tried in order
    pub upstreams: Vec<String>,
}

impl Default for DnsProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: DEFAULT_DNS_ADDRESS.to_string(),
            port: DEFAULT_DNS_PORT,
            upstreams: DEFAULT_DNS_UPSTREAMS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Release checker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct AutoUpdateConfig {
    /// Where the latest release version is published; unset disables checks
    pub url: Option<String>,
    #[serde(with = "duration::as_text")]
    pub freq: Duration,
}

impl Default for AutoUpdateConfig {
    fn default() -> Self {
        Self {
            url: None,
            freq: DEFAULT_AUTOUPDATE_FREQ,
        }
    }
}

impl AutoUpdateConfig {
    pub fn enabled(&self) -> bool {
        self.url.is_some() && !self.freq.is_zero()
    }
}

/// Local SSH server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SshServerConfig {
    pub enabled: bool,
    pub local_port: u16,
    pub sshd_path: PathBuf,
    pub host_key_path: Option<PathBuf>,
}

impl Default for SshServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            local_port: DEFAULT_LOCAL_SSH_PORT,
            sshd_path: PathBuf::from(DEFAULT_SSHD_PATH),
            host_key_path: None,
        }
    }
}

/// Bridge listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct BridgeConfig {
    pub address: String,
    pub port: u16,
    /// Answer each bridged connection with a SOCKS5 handshake
    pub socks5: bool,
    /// Take the destination from each request's jump header
    pub bastion: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BRIDGE_ADDRESS.to_string(),
            port: DEFAULT_BRIDGE_PORT,
            socks5: false,
            bastion: false,
        }
    }
}

impl BridgeConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Edge transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct TransportConfig {
    /// Edge addresses (`host:port`), used round-robin by the HA connections
    pub edge: Vec<String>,
    pub ha_connections: u8,
    /// Consecutive dial failures tolerated per connection
    pub retries: u32,
    #[serde(with = "duration::as_text")]
    pub backoff_base: Duration,
    #[serde(with = "duration::as_text")]
    pub backoff_max: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            edge: Vec::new(),
            ha_connections: DEFAULT_HA_CONNECTIONS,
            retries: DEFAULT_RETRIES,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

/// Complete, immutable configuration snapshot for one daemon run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DaemonConfig {
    #[serde(with = "duration::as_text")]
    pub grace_period: Duration,
    /// Origin URL the tunnel forwards to
    pub url: String,
    /// Public hostname served by the tunnel
    pub hostname: Option<String>,
    pub hello_world: bool,
    pub stdin_control: bool,
    pub pidfile: Option<PathBuf>,
    pub metrics: MetricsConfig,
    pub dns_proxy: DnsProxyConfig,
    pub auto_update: AutoUpdateConfig,
    pub ssh_server: SshServerConfig,
    pub bridge: BridgeConfig,
    pub transport: TransportConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            url: DEFAULT_ORIGIN_URL.to_string(),
            hostname: None,
            hello_world: false,
            stdin_control: false,
            pidfile: None,
            metrics: MetricsConfig::default(),
            dns_proxy: DnsProxyConfig::default(),
            auto_update: AutoUpdateConfig::default(),
            ssh_server: SshServerConfig::default(),
            bridge: BridgeConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Reject contradictory or unusable settings before anything starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.url).map_err(|e| ConfigError::invalid("url", e.to_string()))?;

        if self.transport.ha_connections == 0 {
            return Err(ConfigError::invalid(
                "ha-connections",
                "at least one connection is required",
            ));
        }
        if self.transport.backoff_base > self.transport.backoff_max {
            return Err(ConfigError::invalid(
                "backoff-base",
                "must not exceed backoff-max",
            ));
        }

        if self.dns_proxy.enabled && self.dns_proxy.upstreams.is_empty() {
            return Err(ConfigError::invalid(
                "proxy-dns-upstream",
                "at least one upstream is required",
            ));
        }
        for upstream in &self.dns_proxy.upstreams {
            url::Url::parse(upstream)
                .map_err(|e| ConfigError::invalid("proxy-dns-upstream", e.to_string()))?;
        }

        if let Some(update_url) = &self.auto_update.url {
            url::Url::parse(update_url)
                .map_err(|e| ConfigError::invalid("update-url", e.to_string()))?;
        }

        Ok(())
    }

    /// Reject a hostname equal to the origin the tunnel will serve, after the
    /// hello-world and ssh-server have replaced the configured url.
    pub fn check_origin(&self, origin_url: &str) -> Result<(), ConfigError> {
        match &self.hostname {
            Some(hostname) if !hostname.is_empty() && hostname == origin_url => {
                Err(ConfigError::Conflict(
                    "hostname and url shouldn't match, see --help for more information".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// The daemon only resolves names: no tunnel hostname, no test server.
    pub fn dns_proxy_standalone(&self) -> bool {
        self.dns_proxy.enabled && self.hostname.is_none() && !self.hello_world
    }

    /// Grace period actually applied; stand-alone DNS mode stops immediately.
    pub fn effective_grace_period(&self) -> Duration {
        if self.dns_proxy_standalone() {
            Duration::ZERO
        } else {
            self.grace_period
        }
    }
}
