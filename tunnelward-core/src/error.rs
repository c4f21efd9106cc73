//! Errors raised by the core supervisor, control loop, and bridge handlers.

use crate::supervisor::SubsystemId;
use thiserror::Error;
use tunnelward_common::{DurationParseError, SubsystemError};

/// First subsystem failure captured by the supervisor.
#[derive(Error, Debug)]
#[error("{subsystem} failed: {source}")]
pub struct SupervisorError {
    pub subsystem: SubsystemId,
    #[source]
    pub source: SubsystemError,
}

/// Malformed operator command. Logged by the control loop, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid reconnect delay: {0}")]
    InvalidDelay(#[from] DurationParseError),
}

/// Failure while preparing a bridged stream.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported SOCKS version {0}")]
    SocksVersion(u8),

    #[error("no acceptable SOCKS authentication method")]
    SocksAuth,

    #[error("unsupported SOCKS command {0}")]
    SocksCommand(u8),

    #[error("unsupported SOCKS address type {0}")]
    SocksAddressType(u8),

    #[error("preamble too large: {0} bytes")]
    PreambleTooLarge(usize),

    #[error("failed to encode preamble: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<HandshakeError> for SubsystemError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Io(e) => SubsystemError::Io(e),
            other => SubsystemError::Runtime(other.to_string()),
        }
    }
}
