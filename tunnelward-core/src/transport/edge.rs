use super::backoff::{BackoffConfig, RetryBudget};
use crate::control::ReconnectRequest;
use crate::supervisor::{ReadinessSignal, ShutdownObserver, SubsystemContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::copy_bidirectional;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tunnelward_common::{format_duration, SubsystemError, TransportConfig};
use url::Url;

/// Keeps `ha_connections` outbound connections to the edge and relays each
/// one to the origin once the edge starts sending.
#[derive(Debug, Clone)]
pub struct EdgeConnector {
    edges: Vec<String>,
    origin: String,
    ha_connections: u8,
    retries: u32,
    backoff: BackoffConfig,
}

/// Reconnect queue shared by every connection that is currently serving.
type SharedReconnects = Arc<Mutex<mpsc::Receiver<ReconnectRequest>>>;

/// Why a served connection stopped.
enum Ended {
    Cancelled,
    Restart(Duration),
    Closed,
}

impl EdgeConnector {
    pub fn new(config: &TransportConfig, origin_url: &str) -> Result<Self, SubsystemError> {
        if config.edge.is_empty() {
            return Err(SubsystemError::startup("no edge addresses configured"));
        }
        if config.ha_connections == 0 {
            return Err(SubsystemError::startup("ha-connections must be at least 1"));
        }

        Ok(Self {
            edges: config.edge.clone(),
            origin: origin_addr(origin_url)?,
            ha_connections: config.ha_connections,
            retries: config.retries,
            backoff: BackoffConfig::from(config),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Run every connection until shutdown is forced.
    ///
    /// Fails as soon as one connection exhausts its retries. Each reconnect
    /// request restarts whichever serving connection takes it first.
    pub async fn run(
        self,
        ctx: SubsystemContext,
        reconnects: mpsc::Receiver<ReconnectRequest>,
    ) -> Result<(), SubsystemError> {
        info!(
            "Starting {} edge connections (connector {}), origin {}",
            self.ha_connections, ctx.connector_id, self.origin
        );

        let reconnects: SharedReconnects = Arc::new(Mutex::new(reconnects));
        let mut connections = JoinSet::new();
        for index in 0..usize::from(self.ha_connections) {
            connections.spawn(connection_loop(
                index,
                self.edges[index % self.edges.len()].clone(),
                self.origin.clone(),
                ctx.shutdown.clone(),
                ctx.connected.clone(),
                reconnects.clone(),
                RetryBudget::new(self.backoff.clone(), self.retries),
            ));
        }

        let result = loop {
            tokio::select! {
                () = ctx.shutdown.cancelled() => break Ok(()),
                Some(joined) = connections.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Err(e),
                    Err(e) => break Err(SubsystemError::Panicked(e.to_string())),
                },
            }
        };

        if result.is_err() {
            connections.abort_all();
        }
        while connections.join_next().await.is_some() {}
        result
    }
}

async fn connection_loop(
    index: usize,
    edge: String,
    origin: String,
    shutdown: ShutdownObserver,
    connected: ReadinessSignal,
    reconnects: SharedReconnects,
    mut budget: RetryBudget,
) -> Result<(), SubsystemError> {
    loop {
        if shutdown.is_draining() {
            debug!("Connection {} not redialing while draining", index);
            return Ok(());
        }

        let dialed = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            dialed = TcpStream::connect(&edge) => dialed,
        };

        let delay = match dialed {
            Ok(stream) => {
                budget.on_connected();
                info!("Connection {} registered with edge {}", index, edge);
                if connected.notify() {
                    info!("Tunnel connected");
                }

                #[cfg(feature = "metrics")]
                if let Some(m) = tunnelward_observability::tunnel_metrics() {
                    m.edge_connection_opened();
                }

                let ended = serve(stream, &origin, &shutdown, &reconnects).await;

                #[cfg(feature = "metrics")]
                if let Some(m) = tunnelward_observability::tunnel_metrics() {
                    m.edge_connection_closed();
                }

                match ended {
                    Ended::Cancelled => return Ok(()),
                    Ended::Restart(delay) => {
                        info!(
                            "Restarting connection {} in {}",
                            index,
                            format_duration(delay)
                        );
                        delay
                    }
                    Ended::Closed => {
                        debug!("Connection {} closed by edge", index);
                        budget.on_failure().unwrap_or_default()
                    }
                }
            }
            Err(e) => {
                warn!("Connection {} failed to dial edge {}: {}", index, edge, e);
                if let Some(delay) = budget.on_failure() {
                    delay
                } else {
                    error!(
                        "Connection {} giving up after {} failed attempts",
                        index,
                        budget.failures()
                    );
                    return Err(SubsystemError::runtime(format!(
                        "edge {edge} unreachable after {} attempts: {e}",
                        budget.failures()
                    )));
                }
            }
        };

        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn serve(
    mut edge: TcpStream,
    origin: &str,
    shutdown: &ShutdownObserver,
    reconnects: &SharedReconnects,
) -> Ended {
    let mut first_byte = [0u8; 1];
    tokio::select! {
        () = shutdown.cancelled() => return Ended::Cancelled,
        Some(request) = next_reconnect(reconnects) => return Ended::Restart(request.delay),
        peeked = edge.peek(&mut first_byte) => match peeked {
            Ok(0) | Err(_) => return Ended::Closed,
            Ok(_) => {}
        },
    }

    let mut upstream = match TcpStream::connect(origin).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to reach origin {}: {}", origin, e);
            return Ended::Closed;
        }
    };

    tokio::select! {
        () = shutdown.cancelled() => Ended::Cancelled,
        Some(request) = next_reconnect(reconnects) => Ended::Restart(request.delay),
        relayed = copy_bidirectional(&mut edge, &mut upstream) => {
            if let Ok((up, down)) = relayed {
                debug!("Relayed {} bytes to origin, {} bytes back", up, down);
            }
            Ended::Closed
        }
    }
}

/// Wait for the next reconnect request. Connections queue on the lock, so a
/// dropped wait hands the queue to the next serving connection.
async fn next_reconnect(reconnects: &SharedReconnects) -> Option<ReconnectRequest> {
    reconnects.lock().await.recv().await
}

/// `host:port` of the origin, using the scheme's well-known port if none is
/// given.
pub fn origin_addr(origin_url: &str) -> Result<String, SubsystemError> {
    let url = Url::parse(origin_url)
        .map_err(|e| SubsystemError::startup(format!("invalid origin url {origin_url}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| SubsystemError::startup(format!("origin url {origin_url} has no host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| SubsystemError::startup(format!("origin url {origin_url} has no port")))?;
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::ShutdownSignal;
    use uuid::Uuid;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn context(signal: &ShutdownSignal) -> SubsystemContext {
        SubsystemContext {
            shutdown: signal.observer(),
            connected: ReadinessSignal::new(),
            connector_id: Uuid::nil(),
            version: "test",
        }
    }

    #[test]
    fn test_origin_addr() {
        assert_eq!(origin_addr("http://localhost:8080").unwrap(), "localhost:8080");
        assert_eq!(origin_addr("http://example.com").unwrap(), "example.com:80");
        assert_eq!(origin_addr("https://example.com").unwrap(), "example.com:443");
        assert!(origin_addr("ssh://host").unwrap_err().is_startup());
    }

    #[test]
    fn test_requires_edge() {
        let err = EdgeConnector::new(&TransportConfig::default(), "http://localhost:8080")
            .unwrap_err();
        assert!(err.is_startup());
    }

    #[tokio::test]
    async fn test_relays_edge_to_origin() {
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_url = format!("http://{}", origin.local_addr().unwrap());
        let edge = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let config = TransportConfig {
            edge: vec![edge.local_addr().unwrap().to_string()],
            ha_connections: 1,
            ..TransportConfig::default()
        };
        let connector = EdgeConnector::new(&config, &origin_url).unwrap();

        let signal = ShutdownSignal::new();
        let ctx = context(&signal);
        let (_tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(connector.run(ctx.clone(), rx));

        let (mut edge_side, _) = edge.accept().await.unwrap();
        ctx.connected.wait().await;

        edge_side.write_all(b"ping").await.unwrap();
        let (mut origin_side, _) = origin.accept().await.unwrap();
        let mut buf = [0u8; 4];
        origin_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        origin_side.write_all(b"pong").await.unwrap();
        edge_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        signal.force();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        // Bind then drop to get a port with nothing listening.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let config = TransportConfig {
            edge: vec![addr.to_string()],
            ha_connections: 2,
            retries: 1,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
        };
        let connector = EdgeConnector::new(&config, "http://localhost:8080").unwrap();

        let signal = ShutdownSignal::new();
        let (_tx, rx) = mpsc::channel(1);
        let err = connector.run(context(&signal), rx).await.unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_reconnect_request_restarts_connection() {
        let edge = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = TransportConfig {
            edge: vec![edge.local_addr().unwrap().to_string()],
            ha_connections: 1,
            ..TransportConfig::default()
        };
        let connector = EdgeConnector::new(&config, "http://127.0.0.1:9").unwrap();

        let signal = ShutdownSignal::new();
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(connector.run(context(&signal), rx));

        let (mut first, _) = edge.accept().await.unwrap();
        tx.send(ReconnectRequest::default()).await.unwrap();

        // The old connection is dropped and a new one dialed.
        let mut buf = [0u8; 1];
        assert_eq!(first.read(&mut buf).await.unwrap(), 0);
        let (_second, _) = edge.accept().await.unwrap();

        signal.force();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_back_to_back_reconnects_restart_both_connections() {
        let edge = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = TransportConfig {
            edge: vec![edge.local_addr().unwrap().to_string()],
            ha_connections: 2,
            ..TransportConfig::default()
        };
        let connector = EdgeConnector::new(&config, "http://127.0.0.1:9").unwrap();

        let signal = ShutdownSignal::new();
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(connector.run(context(&signal), rx));

        let (mut first, _) = edge.accept().await.unwrap();
        let (mut second, _) = edge.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Restarted connections stay down long enough for the second
        // request to reach the other one.
        let request = ReconnectRequest {
            delay: Duration::from_millis(500),
        };
        tx.send(request).await.unwrap();
        tx.send(request).await.unwrap();

        let mut buf = [0u8; 1];
        for conn in [&mut first, &mut second] {
            let read = tokio::time::timeout(Duration::from_secs(5), conn.read(&mut buf))
                .await
                .expect("connection was not restarted");
            assert_eq!(read.unwrap(), 0);
        }

        let (_third, _) = edge.accept().await.unwrap();
        let (_fourth, _) = edge.accept().await.unwrap();

        signal.force();
        assert!(task.await.unwrap().is_ok());
    }
}
