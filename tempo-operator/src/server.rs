//! Operator status and metrics HTTP server.

use anyhow::Result;
use axum::http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode};
use axum::{extract::Extension, routing::get, AddExtensionLayer, Json, Router};
use futures::prelude::*;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::app::StatusUpdate;
use crate::config::Config;
use crate::get_metrics_recorder;

/// Spawn the operator's status/metrics server, which uses the default global
/// registry for metrics.
pub fn spawn_status_server(config: &Config, status: watch::Receiver<StatusUpdate>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<()>> {
    let handle = get_metrics_recorder(config).handle();
    let app = Router::new()
        .route("/metrics", get(prometheus_scrape))
        .route("/status", get(operator_status))
        .route("/ready", get(operator_ready))
        .layer(AddExtensionLayer::new(handle))
        .layer(AddExtensionLayer::new(status));
    let server = axum::Server::bind(&([0, 0, 0, 0], config.metrics_port).into())
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            let _res = shutdown.recv().await;
        });
    tracing::info!("status server is listening at 0.0.0.0:{}", config.metrics_port);
    tokio::spawn(server.map_err(anyhow::Error::from))
}

/// Handle Prometheus metrics scraping.
async fn prometheus_scrape(Extension(handle): Extension<PrometheusHandle>) -> (StatusCode, HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("content-type"), HeaderValue::from_static("text/plain; version=0.0.4"));
    (StatusCode::OK, headers, handle.render())
}

/// Report the outcome of the most recent reconciliation pass.
async fn operator_status(Extension(status): Extension<watch::Receiver<StatusUpdate>>) -> Json<StatusUpdate> {
    Json(status.borrow().clone())
}

/// Readiness of the operator itself: OK once a pass has produced an active,
/// consistent deployment.
async fn operator_ready(Extension(status): Extension<watch::Receiver<StatusUpdate>>) -> StatusCode {
    match &*status.borrow() {
        StatusUpdate::Active { .. } => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}
