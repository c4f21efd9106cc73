use super::{preamble, socks};
use crate::error::HandshakeError;
use std::fmt;
use tokio::io::{copy_bidirectional, AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tracing::debug;
use tunnelward_common::{ACCESS_TOKEN_HEADER, JUMP_DESTINATION_HEADER};

/// Per-connection behaviour of a bridge listener. One per listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHandler {
    /// SOCKS5 handshake on the local side, then relay
    Socks,
    /// Relay, preceded by the SSH preamble when a jump destination is given
    SshPreamble,
    /// Plain bidirectional relay
    Verbatim,
}

impl StreamHandler {
    /// SOCKS takes precedence over SSH-server mode; otherwise relay verbatim.
    pub fn select(socks: bool, ssh_server: bool) -> Self {
        if socks {
            StreamHandler::Socks
        } else if ssh_server {
            StreamHandler::SshPreamble
        } else {
            StreamHandler::Verbatim
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamHandler::Socks => "socks",
            StreamHandler::SshPreamble => "ssh-preamble",
            StreamHandler::Verbatim => "verbatim",
        }
    }

    /// Prepare the streams as this handler requires, then relay bytes both
    /// ways until either side closes. Returns bytes copied
    /// `(local -> remote, remote -> local)`.
    pub async fn serve<L, R>(
        self,
        local: &mut L,
        remote: &mut R,
        headers: &HeaderMap,
    ) -> Result<(u64, u64), HandshakeError>
    where
        L: AsyncRead + AsyncWrite + Unpin + ?Sized,
        R: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        match self {
            StreamHandler::Socks => {
                let request = socks::accept_connect(local).await?;
                debug!("SOCKS client requested {}", request);
            }
            StreamHandler::SshPreamble => {
                if let Some(destination) = header_value(headers, JUMP_DESTINATION_HEADER) {
                    let token = header_value(headers, ACCESS_TOKEN_HEADER).unwrap_or_default();
                    preamble::write_ssh_preamble(remote, destination, token).await?;
                }
            }
            StreamHandler::Verbatim => {}
        }

        Ok(copy_bidirectional(local, remote).await?)
    }
}

impl fmt::Display for StreamHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
