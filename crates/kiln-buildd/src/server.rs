use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use kiln_api::{ApiHandler, HttpApi};
use kiln_prometheus::{Encoder, PrometheusMetrics, TextEncoder};
use tracing::error;

/// API routes plus `GET /metrics` and `GET /healthz`.
pub fn router<H: ApiHandler>(handler: Arc<H>, metrics: Arc<PrometheusMetrics>) -> Router {
    let probes = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(metrics);

    HttpApi::new(handler).router().merge(probes)
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metrics.gather(), &mut buffer) {
        error!(error = %e, "encoding metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}
