//! Common utilities and types for `tunnelward`

pub mod config;
pub mod constants;
pub mod duration;
pub mod error;

pub use config::{
    AutoUpdateConfig, BridgeConfig, DaemonConfig, DnsProxyConfig, MetricsConfig, SshServerConfig,
    TransportConfig,
};
pub use constants::{
    ACCESS_TOKEN_HEADER, DEFAULT_GRACE_PERIOD, DEFAULT_HA_CONNECTIONS, DEFAULT_LOCAL_SSH_PORT,
    DEFAULT_METRICS_BIND, DEFAULT_ORIGIN_URL, DEFAULT_RETRIES, JUMP_DESTINATION_HEADER,
};
pub use duration::{format_duration, parse_duration, DurationParseError};
pub use error::{ConfigError, Result, SubsystemError};
