//! Default ports, addresses, and header names for tunnelward services.
//!
//! Use these constants instead of magic numbers so defaults stay consistent
//! across the core library, the CLI, and the tests.

use std::time::Duration;

/// Time the daemon keeps serving after the first shutdown trigger.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Origin the tunnel forwards to when nothing else is configured.
pub const DEFAULT_ORIGIN_URL: &str = "http://localhost:8080";

/// Metrics endpoint bind address (`0` picks a free port).
pub const DEFAULT_METRICS_BIND: &str = "127.0.0.1:0";

/// Bridge listener bind address.
pub const DEFAULT_BRIDGE_ADDRESS: &str = "127.0.0.1";

/// Bridge listener port (`0` picks a free port).
pub const DEFAULT_BRIDGE_PORT: u16 = 0;

/// DNS-over-HTTPS proxy bind address.
pub const DEFAULT_DNS_ADDRESS: &str = "localhost";

/// DNS-over-HTTPS proxy port.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Upstream resolvers used by the DNS-over-HTTPS proxy.
pub const DEFAULT_DNS_UPSTREAMS: [&str; 2] =
    ["https://1.1.1.1/dns-query", "https://1.0.0.1/dns-query"];

/// Port of the local SSH server started with `--ssh-server`.
pub const DEFAULT_LOCAL_SSH_PORT: u16 = 2222;

/// Path of the sshd binary supervised with `--ssh-server`.
pub const DEFAULT_SSHD_PATH: &str = "/usr/sbin/sshd";

/// Number of concurrent edge connections kept by the transport.
pub const DEFAULT_HA_CONNECTIONS: u8 = 4;

/// Consecutive dial failures tolerated per edge connection.
pub const DEFAULT_RETRIES: u32 = 5;

/// How often the auto-updater checks for a new release.
pub const DEFAULT_AUTOUPDATE_FREQ: Duration = Duration::from_secs(24 * 60 * 60);

/// Header naming the per-connection destination in bastion mode.
pub const JUMP_DESTINATION_HEADER: &str = "Tunnel-Jump-Destination";

/// Header carrying the access token forwarded in the SSH preamble.
pub const ACCESS_TOKEN_HEADER: &str = "Tunnel-Access-Token";

/// Default ports used when a bridge target URI carries no explicit port.
pub const SSH_DEFAULT_PORT: u16 = 22;
pub const RDP_DEFAULT_PORT: u16 = 3389;
pub const SMB_DEFAULT_PORT: u16 = 445;
/// There is no registered default for raw TCP; this is a private convention.
pub const TCP_DEFAULT_PORT: u16 = 7864;
