//! DNS-over-HTTPS forwarder.
//!
//! Plain DNS datagrams arriving on the UDP socket are POSTed as
//! `application/dns-message` to each upstream in turn until one answers.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use tunnelward_common::{DnsProxyConfig, SubsystemError};
use tunnelward_core::{ReadinessSignal, SubsystemContext};

const DNS_MESSAGE: &str = "application/dns-message";

/// Largest DNS message over UDP with EDNS0.
const MAX_DATAGRAM: usize = 4096;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DohResolver {
    client: reqwest::Client,
    upstreams: Arc<[String]>,
}

impl DohResolver {
    pub fn new(upstreams: Vec<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            upstreams: upstreams.into(),
        }
    }

    /// Resolve one wire-format query. Returns the last upstream error when
    /// none of them answers.
    pub async fn resolve(&self, query: Vec<u8>) -> Result<Vec<u8>, reqwest::Error> {
        let mut last_error = None;
        for upstream in self.upstreams.iter() {
            match self.exchange(upstream, query.clone()).await {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    debug!("Upstream {} failed: {}", upstream, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            // Validation guarantees at least one upstream.
            None => Ok(Vec::new()),
        }
    }

    async fn exchange(&self, upstream: &str, query: Vec<u8>) -> Result<Vec<u8>, reqwest::Error> {
        let response = self
            .client
            .post(upstream)
            .header(CONTENT_TYPE, DNS_MESSAGE)
            .header(ACCEPT, DNS_MESSAGE)
            .body(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

pub struct DnsProxy {
    socket: Arc<UdpSocket>,
    resolver: DohResolver,
}

impl DnsProxy {
    pub async fn bind(config: &DnsProxyConfig, client: reqwest::Client) -> io::Result<Self> {
        let socket = UdpSocket::bind((config.address.as_str(), config.port)).await?;
        Ok(Self {
            socket: Arc::new(socket),
            resolver: DohResolver::new(config.upstreams.clone(), client),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answer queries until shutdown is forced.
    pub async fn run(self, ctx: SubsystemContext) -> Result<(), SubsystemError> {
        info!("DNS over HTTPS proxy listening on {}", self.local_addr()?);

        let queries = TaskTracker::new();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, peer) = tokio::select! {
                () = ctx.shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received?,
            };

            let query = buf[..len].to_vec();
            let socket = self.socket.clone();
            let resolver = self.resolver.clone();
            let shutdown = ctx.shutdown.clone();
            queries.spawn(async move {
                let answer = tokio::select! {
                    () = shutdown.cancelled() => return,
                    answer = resolver.resolve(query) => answer,
                };
                match answer {
                    Ok(answer) => {
                        if let Err(e) = socket.send_to(&answer, peer).await {
                            warn!("Failed to answer {}: {}", peer, e);
                        }
                    }
                    Err(e) => warn!("No upstream answered query from {}: {}", peer, e),
                }
            });
        }

        queries.close();
        queries.wait().await;
        Ok(())
    }
}

/// Bind the proxy, open `bound` for the rest of startup, then serve.
pub async fn run(
    config: DnsProxyConfig,
    bound: ReadinessSignal,
    ctx: SubsystemContext,
) -> Result<(), SubsystemError> {
    let client = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()
        .map_err(|e| SubsystemError::startup(format!("failed to build DNS client: {e}")))?;
    let proxy = DnsProxy::bind(&config, client).await.map_err(|e| {
        SubsystemError::startup(format!(
            "failed to bind DNS proxy on {}:{}: {e}",
            config.address, config.port
        ))
    })?;
    bound.notify();
    proxy.run(ctx).await
}
