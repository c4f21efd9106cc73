use crate::error::HandshakeError;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Serialize)]
struct SshPreamble<'a> {
    #[serde(rename = "Destination")]
    destination: &'a str,
    #[serde(rename = "JWT")]
    token: &'a str,
}

/// Write the jump-host preamble: a big-endian `u16` length followed by the
/// JSON body `{"Destination": ..., "JWT": ...}`.
pub async fn write_ssh_preamble<W>(
    writer: &mut W,
    destination: &str,
    token: &str,
) -> Result<(), HandshakeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = serde_json::to_vec(&SshPreamble { destination, token })?;
    let len = u16::try_from(body.len()).map_err(|_| HandshakeError::PreambleTooLarge(body.len()))?;

    let mut frame = Vec::with_capacity(2 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
