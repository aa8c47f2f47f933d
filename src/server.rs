use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::collector::MetricsCollector;
use crate::exposition;

pub fn router(collector: Arc<MetricsCollector>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(collector)
}

// Every request triggers a full collection; nothing is cached.
async fn metrics(State(collector): State<Arc<MetricsCollector>>) -> Response {
    match collector.render().await {
        Ok(body) => ([(CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn serve(addr: SocketAddr, app: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    serve_listener(listener, app, shutdown).await
}

/// Serve on an already bound listener until `shutdown` is cancelled.
pub async fn serve_listener(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server failed")
}
