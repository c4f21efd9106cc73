#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for `tunnelward`
//!
//! These tests run real subsystems on loopback sockets under a supervisor.

mod bridge_test;
mod control_test;
mod shutdown_test;

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tunnelward_core::{ShutdownReport, Supervisor, TriggerSource};

/// Start a TCP server that echoes every byte back
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind echo server");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut reader, mut writer) = socket.split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                });
            }
        }
    });

    addr
}

/// Start a TCP server that reads one SSH preamble, hands it to the test, and
/// then echoes the rest of the stream
pub async fn start_preamble_server() -> (SocketAddr, tokio::sync::oneshot::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind preamble server");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut len = [0u8; 2];
        socket.read_exact(&mut len).await.unwrap();
        let mut payload = vec![0u8; usize::from(u16::from_be_bytes(len))];
        socket.read_exact(&mut payload).await.unwrap();
        let _ = tx.send(payload);

        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            if socket.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
    });

    (addr, rx)
}

/// Create a reqwest client configured for testing (no proxy, direct connection)
pub fn make_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("Failed to build reqwest client")
}

/// Ask `supervisor` to stop and wait for the report
pub async fn stop(supervisor: Supervisor) -> ShutdownReport {
    assert!(supervisor
        .trigger_handle()
        .trigger(TriggerSource::Requested));
    supervisor.wait_to_shutdown().await
}
