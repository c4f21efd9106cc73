//! Built-in test origin for `--hello-world`.

use axum::http::{HeaderMap, Method, Uri};
use axum::Router;
use std::fmt::Write;
use tokio::net::TcpListener;
use tracing::info;
use tunnelward_common::SubsystemError;
use tunnelward_core::SubsystemContext;

pub const GREETING: &str = "Hello from tunnelward!";

pub fn router() -> Router {
    Router::new().fallback(greet)
}

/// Greeting followed by what the request looked like on arrival.
async fn greet(method: Method, uri: Uri, headers: HeaderMap) -> String {
    let mut body = format!("{GREETING}\n\n{method} {uri}\n");
    for (name, value) in &headers {
        let _ = writeln!(body, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    body
}

pub async fn run(listener: TcpListener, ctx: SubsystemContext) -> Result<(), SubsystemError> {
    info!("Hello world server listening on http://{}", listener.local_addr()?);
    let shutdown = ctx.shutdown.clone();
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
