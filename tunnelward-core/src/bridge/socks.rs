//! Minimal SOCKS5 server handshake (no-auth, CONNECT only).
//!
//! The outbound side of a bridged connection is already open when the
//! handshake runs, so the requested address is only reported back to the
//! caller; every accepted CONNECT is answered by that connection.

use crate::error::HandshakeError;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NONE_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

pub const REPLY_SUCCEEDED: u8 = 0x00;
pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const REPLY_ADDRESS_NOT_SUPPORTED: u8 = 0x08;

/// Address a SOCKS client asked to CONNECT to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for SocksRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Run the server side of the handshake and reply success.
pub async fn accept_connect<S>(stream: &mut S) -> Result<SocksRequest, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != VERSION {
        return Err(HandshakeError::SocksVersion(header[0]));
    }
    let mut methods = vec![0u8; usize::from(header[1])];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&METHOD_NO_AUTH) {
        stream.write_all(&[VERSION, METHOD_NONE_ACCEPTABLE]).await?;
        return Err(HandshakeError::SocksAuth);
    }
    stream.write_all(&[VERSION, METHOD_NO_AUTH]).await?;

    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    if request[0] != VERSION {
        return Err(HandshakeError::SocksVersion(request[0]));
    }
    if request[1] != CMD_CONNECT {
        send_reply(stream, REPLY_COMMAND_NOT_SUPPORTED).await?;
        return Err(HandshakeError::SocksCommand(request[1]));
    }

    let host = match request[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            Ipv4Addr::from(addr).to_string()
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut name = vec![0u8; usize::from(len[0])];
            stream.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            Ipv6Addr::from(addr).to_string()
        }
        other => {
            send_reply(stream, REPLY_ADDRESS_NOT_SUPPORTED).await?;
            return Err(HandshakeError::SocksAddressType(other));
        }
    };

    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;

    send_reply(stream, REPLY_SUCCEEDED).await?;
    Ok(SocksRequest {
        host,
        port: u16::from_be_bytes(port),
    })
}

async fn send_reply<W>(stream: &mut W, status: u8) -> Result<(), HandshakeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    // Bound address is not meaningful here; report 0.0.0.0:0.
    let response = [VERSION, status, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0];
    stream.write_all(&response).await?;
    Ok(())
}
