use super::{make_client, start_echo_server, stop};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tunnelward_common::SubsystemError;
use tunnelward_core::{
    BridgePlan, BridgeServer, ReadinessSignal, SubsystemId, Supervisor, SupervisorState,
    TriggerSource,
};
use tunnelward_observability::{serve_metrics, ReadyCheck};

#[tokio::test]
async fn test_retained_listener_outlives_subsystem_handle() {
    let supervisor = Supervisor::new(Duration::ZERO);
    let listener = supervisor.listeners().bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    // The socket is still open, so the connection queues in the backlog.
    let _client = TcpStream::connect(addr).await.unwrap();

    let lent = supervisor.listeners().lend(addr).unwrap().unwrap();
    let (_, peer) = lent.accept().await.unwrap();
    assert!(peer.ip().is_loopback());
    assert_eq!(supervisor.listeners().addrs(), vec![addr]);
}

#[tokio::test]
async fn test_bridge_keeps_accepting_while_draining() {
    tunnelward_tests::init_test_logging();

    let echo = start_echo_server().await;
    let grace = Duration::from_millis(500);
    let mut supervisor = Supervisor::new(grace);
    let listener = supervisor.listeners().bind("127.0.0.1:0").await.unwrap();
    let plan = BridgePlan::dispatch(&format!("tcp://{echo}"), false, false, false).unwrap();
    let server = BridgeServer::new(listener, plan);
    let addr = server.local_addr().unwrap();
    supervisor.launch(SubsystemId::Bridge, server.run(supervisor.context()));

    let mut state = supervisor.state();
    let trigger = supervisor.trigger_handle();
    let started = Instant::now();
    let shutdown = tokio::spawn(supervisor.wait_to_shutdown());
    assert!(trigger.trigger(TriggerSource::Signal("SIGTERM")));

    state
        .wait_for(|s| *s == SupervisorState::Draining)
        .await
        .unwrap();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();
    ws.send(Message::binary(b"draining".to_vec())).await.unwrap();
    let echoed = ws.next().await.unwrap().unwrap();
    assert_eq!(&echoed.into_data()[..], b"draining");

    let report = shutdown.await.unwrap();
    assert!(started.elapsed() >= grace);
    assert_eq!(*state.borrow(), SupervisorState::Stopped);
    assert!(report.into_result().is_ok());

    // The supervisor's own copy of the socket is gone too.
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_second_signal_skips_grace_period() {
    let supervisor = Supervisor::new(Duration::from_secs(60));
    let ctx = supervisor.context();
    let mut state = supervisor.state();
    let trigger = supervisor.trigger_handle();
    let shutdown = tokio::spawn(supervisor.wait_to_shutdown());

    trigger.trigger(TriggerSource::Signal("SIGINT"));
    state
        .wait_for(|s| *s == SupervisorState::Draining)
        .await
        .unwrap();
    assert!(!ctx.shutdown.is_cancelled());

    trigger.trigger(TriggerSource::Signal("SIGINT"));
    let report = tokio::time::timeout(Duration::from_secs(5), shutdown)
        .await
        .expect("second signal did not force shutdown")
        .unwrap();
    assert!(ctx.shutdown.is_cancelled());
    assert!(report.into_result().is_ok());
}

#[tokio::test]
async fn test_failure_reported_after_drain() {
    let mut supervisor = Supervisor::new(Duration::from_millis(200));
    let ctx = supervisor.context();

    supervisor.launch(SubsystemId::HelloWorld, async move {
        ctx.shutdown.cancelled().await;
        Ok(())
    });
    supervisor.launch(SubsystemId::Transport, async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Err(SubsystemError::runtime("edge went away"))
    });

    let report = supervisor.wait_to_shutdown().await;
    assert_eq!(report.launched, 2);
    assert_eq!(report.observed, 2);
    let err = report.into_result().unwrap_err();
    assert_eq!(err.subsystem, SubsystemId::Transport);
    assert_eq!(err.to_string(), "transport failed: edge went away");
}

#[tokio::test]
async fn test_ready_endpoint_follows_connected_signal() {
    let mut supervisor = Supervisor::new(Duration::ZERO);
    let ctx = supervisor.context();
    let listener = supervisor.listeners().bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let connected = ctx.connected.clone();
    let ready: ReadyCheck = Arc::new(move || connected.is_ready());
    let shutdown = ctx.shutdown.clone();
    supervisor.launch(SubsystemId::Metrics, async move {
        serve_metrics(listener, ready, async move { shutdown.cancelled().await })
            .await
            .map_err(SubsystemError::from)
    });

    let client = make_client();
    let url = format!("http://{addr}/ready");

    let before = client.get(&url).send().await.unwrap();
    assert_eq!(before.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    assert!(ctx.connected.notify());
    assert!(!ctx.connected.notify());
    let after = client.get(&url).send().await.unwrap();
    assert_eq!(after.status(), reqwest::StatusCode::OK);

    let report = stop(supervisor).await;
    assert_eq!(report.observed, 1);
    assert!(report.into_result().is_ok());
}

#[tokio::test]
async fn test_gate_interrupted_by_signal() {
    let mut supervisor = Supervisor::new(Duration::ZERO);
    let gate = ReadinessSignal::new();
    let trigger = supervisor.trigger_handle();

    let waiter = tokio::spawn(async move {
        let passed = supervisor.pass_gate(&gate).await;
        (passed, supervisor)
    });
    trigger.trigger(TriggerSource::Signal("SIGTERM"));

    let (passed, supervisor) = waiter.await.unwrap();
    assert!(!passed);
    assert!(supervisor.listeners().is_empty());
    assert!(supervisor.wait_to_shutdown().await.into_result().is_ok());
}
