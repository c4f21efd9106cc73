use std::sync::Arc;
use tokio::net::TcpListener;
use tunnelward_common::SubsystemError;
use tunnelward_core::SubsystemContext;
use tunnelward_observability::{serve_metrics, ReadyCheck};

/// Serve `/metrics`, `/healthcheck` and `/ready`. Readiness follows the
/// tunnel's connected signal.
pub async fn run(listener: TcpListener, ctx: SubsystemContext) -> Result<(), SubsystemError> {
    let connected = ctx.connected.clone();
    let ready: ReadyCheck = Arc::new(move || connected.is_ready());
    let shutdown = ctx.shutdown.clone();

    serve_metrics(listener, ready, async move { shutdown.cancelled().await }).await?;
    Ok(())
}
