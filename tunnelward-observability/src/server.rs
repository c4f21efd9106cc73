use crate::metrics::gather_metrics;
use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Answers whether the daemon counts as ready for `/ready`.
pub type ReadyCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Serve `/metrics`, `/healthcheck` and `/ready` on an already bound
/// listener until `shutdown` resolves.
pub async fn serve_metrics<S>(
    listener: TcpListener,
    ready: ReadyCheck,
    shutdown: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthcheck", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(ready);

    info!("Starting metrics server on {}/metrics", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

async fn ready_handler(State(ready): State<ReadyCheck>) -> (StatusCode, &'static str) {
    if ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
