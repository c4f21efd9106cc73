//! Proxy destination dispatch and the bridge listener.
//!
//! [`BridgePlan::dispatch`] decides from the origin URL and mode flags
//! whether a bridge listener is needed, where it relays to, and which
//! [`StreamHandler`] it installs.

pub mod handler;
pub mod preamble;
pub mod server;
pub mod socks;
pub mod target;
mod ws;

pub use handler::StreamHandler;
pub use server::BridgeServer;
pub use target::{needs_bridge_listener, BridgeTarget};

/// Resolved bridge listener setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePlan {
    /// Fixed destination; `None` in pure bastion mode
    pub target: Option<BridgeTarget>,
    pub handler: StreamHandler,
    pub bastion: bool,
}

impl BridgePlan {
    /// Returns `None` when `origin_url` needs no bridge and bastion mode is
    /// off; the tunnel then forwards straight to the origin.
    pub fn dispatch(origin_url: &str, bastion: bool, socks: bool, ssh_server: bool) -> Option<Self> {
        let target = BridgeTarget::from_uri(origin_url);
        if !needs_bridge_listener(target.as_ref(), bastion) {
            return None;
        }
        Some(Self {
            target,
            handler: StreamHandler::select(socks, ssh_server),
            bastion,
        })
    }
}
