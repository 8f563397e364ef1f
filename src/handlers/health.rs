//! Health and Infrastructure Handlers
//!
//! Service info, backend liveness, and Prometheus metrics.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use anyhow::Context;
use tracing::warn;

use super::router::AppState;
use super::types::{HealthResponse, ServiceInfo, UnhealthyResponse};
use crate::errors::AppError;
use crate::metrics;

/// GET / - Service name and version
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "MemoriGraph API",
        version: env!("CARGO_PKG_VERSION"),
        description: "Knowledge-graph memory for users, therapy sessions and profile search",
    })
}

/// GET /health - 200 when both backends answer, 503 otherwise
pub async fn health(State(state): State<AppState>) -> Response {
    match state.health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                graph_engine: "connected",
                graph_storage: "connected",
            }),
        )
            .into_response(),
        Err(e) => {
            let error = format!("{e:#}");
            warn!(error = %error, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(UnhealthyResponse {
                    status: "unhealthy",
                    error,
                }),
            )
                .into_response()
        }
    }
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_endpoint() -> Result<String, AppError> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = metrics::METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    Ok(String::from_utf8(buffer).context("Metrics output is not UTF-8")?)
}
