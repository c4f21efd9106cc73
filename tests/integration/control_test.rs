use super::stop;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tunnelward_common::TransportConfig;
use tunnelward_core::control::reconnect_channel;
use tunnelward_core::{ControlLoop, EdgeConnector, SubsystemId, Supervisor};

#[tokio::test]
async fn test_reconnect_command_restarts_edge_connection() {
    tunnelward_tests::init_test_logging();

    let edge = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = TransportConfig {
        edge: vec![edge.local_addr().unwrap().to_string()],
        ha_connections: 1,
        ..TransportConfig::default()
    };
    let connector = EdgeConnector::new(&config, "http://127.0.0.1:9").unwrap();

    let mut supervisor = Supervisor::new(Duration::ZERO);
    let ctx = supervisor.context();
    let (requests, reconnects) = reconnect_channel();
    supervisor.launch(SubsystemId::Transport, connector.run(ctx.clone(), reconnects));

    let (mut operator, input) = tokio::io::duplex(256);
    let control = tokio::spawn(
        ControlLoop::new(BufReader::new(input), requests, ctx.shutdown.clone()).run(),
    );

    let (mut first, _) = edge.accept().await.unwrap();
    ctx.connected.wait().await;

    // Garbage and help are logged and ignored; the reconnect goes through.
    operator
        .write_all(b"bogus\nhelp\nreconnect 10ms\n")
        .await
        .unwrap();

    let mut buf = [0u8; 1];
    let closed = tokio::time::timeout(Duration::from_secs(5), first.read(&mut buf))
        .await
        .expect("connection was not restarted");
    assert_eq!(closed.unwrap(), 0);

    let redialed = tokio::time::timeout(Duration::from_secs(5), edge.accept()).await;
    assert!(redialed.is_ok());

    let report = stop(supervisor).await;
    assert!(report.into_result().is_ok());
    control.await.unwrap();
}

#[tokio::test]
async fn test_bad_delay_keeps_loop_running() {
    let supervisor = Supervisor::new(Duration::ZERO);
    let ctx = supervisor.context();
    let (requests, mut reconnects) = reconnect_channel();

    let (mut operator, input) = tokio::io::duplex(256);
    let control = tokio::spawn(
        ControlLoop::new(BufReader::new(input), requests, ctx.shutdown.clone()).run(),
    );

    operator
        .write_all(b"reconnect soon\nreconnect 2s\n")
        .await
        .unwrap();
    let request = reconnects.recv().await.unwrap();
    assert_eq!(request.delay, Duration::from_secs(2));

    // Closing the input ends the loop.
    drop(operator);
    control.await.unwrap();
    assert!(reconnects.recv().await.is_none());

    assert!(stop(supervisor).await.into_result().is_ok());
}
