//! HTTP request logging and metrics middleware

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Log every request, record its latency, and report the latency to the
/// client in `X-Process-Time` (seconds).
pub async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    // Route template when the router matched one, otherwise a normalized path
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| normalize_path(&path));

    info!(method = %method, path = %path, "Request");

    let mut response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &endpoint, &status])
        .observe(duration);

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, &status])
        .inc();

    if let Ok(value) = HeaderValue::from_str(&format!("{duration:.6}")) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }

    info!(
        method = %method,
        path = %path,
        status = %status,
        latency_ms = duration * 1000.0,
        "Response"
    );

    response
}

/// Normalize path to prevent metric cardinality explosion
/// /api/v1/users/user123 -> /api/v1/users/{id}
fn normalize_path(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut previous = "";

    for part in path.split('/').filter(|p| !p.is_empty()) {
        if matches!(previous, "users" | "sessions") || is_id(part) {
            normalized.push("{id}");
        } else {
            normalized.push(part);
        }
        previous = part;
    }

    format!("/{}", normalized.join("/"))
}

/// Check if a path segment looks like an ID (UUID, numeric, hash)
fn is_id(segment: &str) -> bool {
    if segment.contains('-') && segment.len() >= 32 {
        return true;
    }

    if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    segment.len() > 20
}
