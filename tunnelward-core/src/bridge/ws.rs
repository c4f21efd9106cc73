use futures_util::{SinkExt, StreamExt};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

const READ_BUF_SIZE: usize = 16 * 1024;

/// Move bytes between a WebSocket and one end of an in-memory pipe.
///
/// Binary and text frames become stream bytes; stream bytes go out as binary
/// frames. Returns when both directions have finished.
pub async fn pump<S>(ws: WebSocketStream<S>, pipe: DuplexStream)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut frames) = ws.split();
    let (mut reader, mut writer) = tokio::io::split(pipe);

    let inbound = async {
        while let Some(frame) = frames.next().await {
            match frame.map_err(io::Error::other)? {
                Message::Binary(data) => writer.write_all(&data).await?,
                Message::Text(text) => writer.write_all(text.as_str().as_bytes()).await?,
                Message::Close(_) => break,
                _ => {}
            }
        }
        writer.shutdown().await
    };

    let outbound = async {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink.send(Message::binary(buf[..n].to_vec()))
                .await
                .map_err(io::Error::other)?;
        }
        sink.close().await.map_err(io::Error::other)
    };

    let (inbound, outbound): (io::Result<()>, io::Result<()>) = tokio::join!(inbound, outbound);
    if let Err(e) = inbound {
        debug!("WebSocket inbound ended: {}", e);
    }
    if let Err(e) = outbound {
        debug!("WebSocket outbound ended: {}", e);
    }
}
