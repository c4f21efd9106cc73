use std::fmt;
use tunnelward_common::constants::{
    RDP_DEFAULT_PORT, SMB_DEFAULT_PORT, SSH_DEFAULT_PORT, TCP_DEFAULT_PORT,
};
use url::Url;

/// Fixed destination of a bridge listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTarget {
    pub hostname: String,
    pub port: u16,
}

impl BridgeTarget {
    /// Derive a target from `uri` when its scheme calls for a bridge.
    ///
    /// `ssh`, `rdp`, `smb` and `tcp` are recognised; an explicit port wins
    /// over the scheme default. Anything else yields `None`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let url = Url::parse(uri).ok()?;
        let default_port = scheme_default_port(url.scheme())?;
        let hostname = url.host_str().filter(|h| !h.is_empty())?.to_string();

        Some(Self {
            hostname,
            port: url.port().unwrap_or(default_port),
        })
    }
}

impl fmt::Display for BridgeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

fn scheme_default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "ssh" => Some(SSH_DEFAULT_PORT),
        "rdp" => Some(RDP_DEFAULT_PORT),
        "smb" => Some(SMB_DEFAULT_PORT),
        "tcp" => Some(TCP_DEFAULT_PORT),
        _ => None,
    }
}

/// A bridge listener is opened for a recognised target or in bastion mode.
pub fn needs_bridge_listener(target: Option<&BridgeTarget>, bastion: bool) -> bool {
    target.is_some() || bastion
}
