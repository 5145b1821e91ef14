//! HTTP endpoint exposing the tarpit metrics to Prometheus.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::metrics::TarpitMetrics;
use crate::server::ServerError;

/// Handles HTTP requests to the /metrics endpoint.
async fn metrics_handler(State(metrics): State<Arc<TarpitMetrics>>) -> Response {
    match metrics.gather() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn router(metrics: Arc<TarpitMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Bind the metrics endpoint. Failure is fatal, same as the trap listener.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve `/metrics` until shutdown is signalled.
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<TarpitMetrics>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Prometheus metrics server listening on http://{}/metrics", addr);
    }

    let result = axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move {
            // A closed channel means the process is going away too.
            let _ = shutdown_rx.recv().await;
            info!("Metrics server shutting down");
        })
        .await;

    if let Err(e) = result {
        error!(error = %e, "Metrics server failed");
    }
}
