use super::{start_echo_server, start_preamble_server, stop};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tunnelward_common::{ACCESS_TOKEN_HEADER, JUMP_DESTINATION_HEADER};
use tunnelward_core::{BridgePlan, BridgeServer, StreamHandler, SubsystemId, Supervisor};

/// Byte-stream view of a bridged WebSocket
struct WsPipe {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: Vec<u8>,
}

impl WsPipe {
    async fn write(&mut self, data: &[u8]) {
        self.ws.send(Message::binary(data.to_vec())).await.unwrap();
    }

    async fn read_exact(&mut self, len: usize) -> Vec<u8> {
        while self.pending.len() < len {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timed out waiting for bridged data")
                .expect("bridge closed the WebSocket")
                .unwrap();
            if frame.is_binary() || frame.is_text() {
                self.pending.extend_from_slice(&frame.into_data());
            }
        }
        self.pending.drain(..len).collect()
    }
}

async fn start_bridge(plan: BridgePlan) -> (Supervisor, SocketAddr) {
    tunnelward_tests::init_test_logging();

    let mut supervisor = Supervisor::new(Duration::ZERO);
    let listener = supervisor.listeners().bind("127.0.0.1:0").await.unwrap();
    let server = BridgeServer::new(listener, plan);
    let addr = server.local_addr().unwrap();
    supervisor.launch(SubsystemId::Bridge, server.run(supervisor.context()));
    (supervisor, addr)
}

async fn connect(addr: SocketAddr, headers: &[(&'static str, String)]) -> WsPipe {
    let mut request = format!("ws://{addr}").into_client_request().unwrap();
    for (name, value) in headers {
        request
            .headers_mut()
            .insert(*name, value.parse().unwrap());
    }
    let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    WsPipe {
        ws,
        pending: Vec::new(),
    }
}

#[tokio::test]
async fn test_tcp_origin_relayed_verbatim() {
    let echo = start_echo_server().await;
    let plan = BridgePlan::dispatch(&format!("tcp://{echo}"), false, false, false).unwrap();
    assert_eq!(plan.handler, StreamHandler::Verbatim);
    let (supervisor, addr) = start_bridge(plan).await;

    let mut pipe = connect(addr, &[]).await;
    pipe.write(b"hello bridge").await;
    assert_eq!(pipe.read_exact(12).await, b"hello bridge");

    let report = stop(supervisor).await;
    assert_eq!(report.launched, 1);
    assert_eq!(report.observed, 1);
    assert!(report.into_result().is_ok());
}

#[tokio::test]
async fn test_bastion_rejects_missing_destination() {
    let plan = BridgePlan::dispatch("http://localhost:8080", true, false, false).unwrap();
    assert!(plan.target.is_none());
    let (supervisor, addr) = start_bridge(plan).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap_err();
    match err {
        WsError::Http(response) => assert_eq!(response.status().as_u16(), 400),
        other => panic!("expected HTTP rejection, got {other}"),
    }

    assert!(stop(supervisor).await.into_result().is_ok());
}

#[tokio::test]
async fn test_bastion_follows_jump_header() {
    let echo = start_echo_server().await;
    let plan = BridgePlan::dispatch("http://localhost:8080", true, false, false).unwrap();
    let (supervisor, addr) = start_bridge(plan).await;

    let mut pipe = connect(addr, &[(JUMP_DESTINATION_HEADER, echo.to_string())]).await;
    pipe.write(b"via bastion").await;
    assert_eq!(pipe.read_exact(11).await, b"via bastion");

    assert!(stop(supervisor).await.into_result().is_ok());
}

#[tokio::test]
async fn test_static_target_wins_over_jump_header() {
    let echo = start_echo_server().await;
    let plan = BridgePlan::dispatch(&format!("tcp://{echo}"), true, false, false).unwrap();
    let (supervisor, addr) = start_bridge(plan).await;

    // Nothing listens on port 1; the header must be ignored.
    let mut pipe = connect(addr, &[(JUMP_DESTINATION_HEADER, "127.0.0.1:1".to_string())]).await;
    pipe.write(b"static").await;
    assert_eq!(pipe.read_exact(6).await, b"static");

    assert!(stop(supervisor).await.into_result().is_ok());
}

#[tokio::test]
async fn test_socks_handshake_then_relay() {
    let echo = start_echo_server().await;
    let plan = BridgePlan::dispatch(&format!("tcp://{echo}"), false, true, true).unwrap();
    assert_eq!(plan.handler, StreamHandler::Socks);
    let (supervisor, addr) = start_bridge(plan).await;

    let mut pipe = connect(addr, &[]).await;

    // Greeting: version 5, one method, no authentication.
    pipe.write(&[0x05, 0x01, 0x00]).await;
    assert_eq!(pipe.read_exact(2).await, [0x05, 0x00]);

    // CONNECT example.com:80
    let mut request = vec![0x05, 0x01, 0x00, 0x03, 11];
    request.extend_from_slice(b"example.com");
    request.extend_from_slice(&80u16.to_be_bytes());
    pipe.write(&request).await;
    let reply = pipe.read_exact(10).await;
    assert_eq!(&reply[..2], [0x05, 0x00]);

    pipe.write(b"after socks").await;
    assert_eq!(pipe.read_exact(11).await, b"after socks");

    assert!(stop(supervisor).await.into_result().is_ok());
}

#[tokio::test]
async fn test_ssh_preamble_sent_before_stream() {
    let (sshd, preamble) = start_preamble_server().await;
    let plan = BridgePlan::dispatch(&format!("ssh://{sshd}"), false, false, true).unwrap();
    assert_eq!(plan.handler, StreamHandler::SshPreamble);
    let (supervisor, addr) = start_bridge(plan).await;

    let mut pipe = connect(
        addr,
        &[
            (JUMP_DESTINATION_HEADER, "internal.host:22".to_string()),
            (ACCESS_TOKEN_HEADER, "secret-token".to_string()),
        ],
    )
    .await;

    let payload = preamble.await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(json["Destination"], "internal.host:22");
    assert_eq!(json["JWT"], "secret-token");

    pipe.write(b"SSH-2.0-test").await;
    assert_eq!(pipe.read_exact(12).await, b"SSH-2.0-test");

    assert!(stop(supervisor).await.into_result().is_ok());
}

#[tokio::test]
async fn test_inflight_connection_ends_at_forced_stop() {
    let echo = start_echo_server().await;
    let plan = BridgePlan::dispatch(&format!("tcp://{echo}"), false, false, false).unwrap();
    let (supervisor, addr) = start_bridge(plan).await;

    let mut pipe = connect(addr, &[]).await;
    pipe.write(b"x").await;
    assert_eq!(pipe.read_exact(1).await, b"x");

    assert!(stop(supervisor).await.into_result().is_ok());

    // The server side is gone: the stream ends or errors out.
    let next = tokio::time::timeout(Duration::from_secs(5), pipe.ws.next())
        .await
        .expect("connection still open after forced stop");
    assert!(!matches!(next, Some(Ok(Message::Binary(_)))));
}
