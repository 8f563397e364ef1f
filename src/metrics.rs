//! Prometheus metrics
//!
//! Exposes request rates and latencies, graph and engine call outcomes, and the
//! outcome of background session linking.
//!
//! NOTE: user_id never appears in labels; it would make cardinality unbounded.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "memorigraph_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("memorigraph_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Backend Metrics
    // ============================================================================

    /// Graph database statements by operation
    pub static ref GRAPH_QUERY_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("memorigraph_graph_query_total", "Total graph database statements"),
        &["operation", "result"]
    ).unwrap();

    pub static ref GRAPH_QUERY_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "memorigraph_graph_query_duration_seconds",
            "Graph database statement duration"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["operation"]
    ).unwrap();

    /// Knowledge engine and embedding calls by operation
    pub static ref ENGINE_CALL_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("memorigraph_engine_call_total", "Total knowledge engine calls"),
        &["operation", "result"]  // operation: "embed", "add_episode", "search"
    ).unwrap();

    /// Episode ingestion runs LLM extraction, hence the long tail
    pub static ref ENGINE_CALL_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "memorigraph_engine_call_duration_seconds",
            "Knowledge engine call duration"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["operation"]
    ).unwrap();

    // ============================================================================
    // Workflow Metrics
    // ============================================================================

    /// Background linking runs by outcome
    pub static ref SESSION_LINK_RUNS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("memorigraph_session_link_runs_total", "Background session linking runs"),
        &["outcome"]  // outcome: "linked", "noop", "failed"
    ).unwrap();

    pub static ref SESSIONS_LINKED_TOTAL: IntCounter = IntCounter::new(
        "memorigraph_sessions_linked_total",
        "User to session links created"
    ).unwrap();

    pub static ref SESSIONS_RECORDED_TOTAL: IntCounter = IntCounter::new(
        "memorigraph_sessions_recorded_total",
        "Sessions submitted to the knowledge engine"
    ).unwrap();

    pub static ref USER_DELETIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("memorigraph_user_deletions_total", "User deletion requests by status"),
        &["status"]
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    // Request metrics
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    // Backend metrics
    METRICS_REGISTRY.register(Box::new(GRAPH_QUERY_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(GRAPH_QUERY_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(ENGINE_CALL_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(ENGINE_CALL_DURATION.clone()))?;

    // Workflow metrics
    METRICS_REGISTRY.register(Box::new(SESSION_LINK_RUNS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(SESSIONS_LINKED_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(SESSIONS_RECORDED_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(USER_DELETIONS_TOTAL.clone()))?;

    Ok(())
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "error"
    }
}

pub fn record_graph_query(operation: &str, ok: bool, seconds: f64) {
    GRAPH_QUERY_TOTAL
        .with_label_values(&[operation, result_label(ok)])
        .inc();
    GRAPH_QUERY_DURATION
        .with_label_values(&[operation])
        .observe(seconds);
}

pub fn record_engine_call(operation: &str, ok: bool, seconds: f64) {
    ENGINE_CALL_TOTAL
        .with_label_values(&[operation, result_label(ok)])
        .inc();
    ENGINE_CALL_DURATION
        .with_label_values(&[operation])
        .observe(seconds);
}

pub fn record_session_link(outcome: &str, linked: u64) {
    SESSION_LINK_RUNS_TOTAL.with_label_values(&[outcome]).inc();
    SESSIONS_LINKED_TOTAL.inc_by(linked);
}

pub fn record_session_recorded() {
    SESSIONS_RECORDED_TOTAL.inc();
}

pub fn record_user_deletion(status: &str) {
    USER_DELETIONS_TOTAL.with_label_values(&[status]).inc();
}
