use super::handler::{header_value, StreamHandler};
use super::{ws, BridgePlan, BridgeTarget};
use crate::error::HandshakeError;
use crate::supervisor::SubsystemContext;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderMap, StatusCode};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use tunnelward_common::{SubsystemError, JUMP_DESTINATION_HEADER};

const PIPE_CAPACITY: usize = 64 * 1024;

/// WebSocket bridge listener.
///
/// Each accepted WebSocket is relayed through one outbound TCP connection to
/// the plan's fixed target, or in bastion mode to the destination named by the
/// request's jump header.
pub struct BridgeServer {
    listener: TcpListener,
    route: Arc<Route>,
}

#[derive(Debug)]
struct Route {
    target: Option<BridgeTarget>,
    handler: StreamHandler,
    bastion: bool,
}

impl BridgeServer {
    pub fn new(listener: TcpListener, plan: BridgePlan) -> Self {
        Self {
            listener,
            route: Arc::new(Route {
                target: plan.target,
                handler: plan.handler,
                bastion: plan.bastion,
            }),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until shutdown is forced. Draining does not stop the listener.
    pub async fn run(self, ctx: SubsystemContext) -> Result<(), SubsystemError> {
        let addr = self.listener.local_addr()?;
        match &self.route.target {
            Some(target) => info!(
                "Bridge listening on {} -> {} ({} handler)",
                addr, target, self.route.handler
            ),
            None => info!(
                "Bridge listening on {} in bastion mode ({} handler)",
                addr, self.route.handler
            ),
        }

        let connections = TaskTracker::new();
        loop {
            tokio::select! {
                () = ctx.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let route = self.route.clone();
                        let shutdown = ctx.shutdown.clone();
                        connections.spawn(async move {
                            tokio::select! {
                                () = shutdown.cancelled() => {
                                    debug!("Bridge connection from {} cancelled", peer);
                                }
                                result = route.handle(stream, peer) => {
                                    if let Err(e) = result {
                                        warn!("Bridge connection from {} failed: {}", peer, e);
                                    }
                                }
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Bridge accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        connections.close();
        connections.wait().await;
        info!("Bridge listener on {} stopped", addr);
        Ok(())
    }
}

impl Route {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), HandshakeError> {
        let needs_header = self.target.is_none();
        let mut headers = HeaderMap::new();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            if needs_header && header_value(req.headers(), JUMP_DESTINATION_HEADER).is_none() {
                let mut reject =
                    ErrorResponse::new(Some(format!("missing {JUMP_DESTINATION_HEADER} header")));
                *reject.status_mut() = StatusCode::BAD_REQUEST;
                return Err(reject);
            }
            headers = req.headers().clone();
            Ok(resp)
        };

        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .map_err(io::Error::other)?;

        let destination = match &self.target {
            Some(target) => target.to_string(),
            None => header_value(&headers, JUMP_DESTINATION_HEADER)
                .unwrap_or_default()
                .to_string(),
        };
        debug!("Bridging {} to {}", peer, destination);
        let mut remote = TcpStream::connect(&destination).await?;

        #[cfg(feature = "metrics")]
        if let Some(m) = tunnelward_observability::tunnel_metrics() {
            m.bridge_connection(self.handler.as_str());
        }

        let (mut local, pipe) = tokio::io::duplex(PIPE_CAPACITY);
        let (_, relayed) = tokio::join!(
            ws::pump(ws, pipe),
            self.handler.serve(&mut local, &mut remote, &headers)
        );
        let (up, down) = relayed?;
        debug!("Bridge {} closed ({} bytes up, {} bytes down)", peer, up, down);
        Ok(())
    }
}
