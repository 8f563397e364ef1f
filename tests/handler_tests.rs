//! HTTP endpoint tests.
//!
//! Drives the full router (middleware included) over in-memory backends and
//! checks status codes, body shapes and the error contract.
//!
//! Run with: `cargo test --test handler_tests`

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use memorigraph::{
    engine::{Fact, InMemoryEngine},
    errors,
    graph_store::{memory::HAS_SESSION, InMemoryGraph},
    handlers::{build_router, MemoryGateway},
};

// ═══════════════════════════════════════════════════════════════════════
// Test infrastructure
// ═══════════════════════════════════════════════════════════════════════

struct Harness {
    graph: Arc<InMemoryGraph>,
    engine: Arc<InMemoryEngine>,
    gateway: Arc<MemoryGateway>,
}

impl Harness {
    fn new() -> Self {
        let graph = Arc::new(InMemoryGraph::new());
        let engine = Arc::new(InMemoryEngine::new(graph.clone()));
        let gateway = Arc::new(MemoryGateway::new(graph.clone(), engine.clone()));
        Self {
            graph,
            engine,
            gateway,
        }
    }

    fn app(&self) -> Router {
        build_router(self.gateway.clone())
    }

    async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        (status, body)
    }
}

// ── request helpers ──

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_raw(uri: &str, raw: &'static str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(raw))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_user_then_fetch() {
    let h = Harness::new();

    let (status, created) = h
        .call(post("/api/v1/users", json!({ "user_id": "u1", "user_name": "Alice" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["user_id"], "u1");
    assert!(uuid::Uuid::parse_str(created["uuid"].as_str().unwrap()).is_ok());

    let (status, fetched) = h.call(get("/api/v1/users/u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["uuid"], created["uuid"]);
    assert_eq!(fetched["user_name"], "Alice");
}

#[tokio::test]
async fn create_user_twice_keeps_identity() {
    let h = Harness::new();

    let (_, first) = h
        .call(post("/api/v1/users", json!({ "user_id": "u1", "user_name": "Alice" })))
        .await;
    let (status, second) = h
        .call(post("/api/v1/users", json!({ "user_id": "u1", "user_name": "Alicia" })))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["uuid"], second["uuid"]);
    assert_eq!(second["user_name"], "Alice");
}

#[tokio::test]
async fn user_validation_errors_are_422() {
    let h = Harness::new();

    let (status, body) = h
        .call(post("/api/v1/users", json!({ "user_id": "bad id!", "user_name": "Alice" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().starts_with("user_id"));

    let (status, body) = h
        .call(post("/api/v1/users", json!({ "user_id": "u1", "user_name": "  " })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().starts_with("user_name"));

    let (status, body) = h.call(post("/api/v1/users", json!({ "user_id": "u1" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("user_name"));

    let (status, _) = h.call(post_raw("/api/v1/users", "{not json")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(h.graph.mutation_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sessions_number_sequentially_and_link() {
    let h = Harness::new();
    h.call(post("/api/v1/users", json!({ "user_id": "u1", "user_name": "Alice" })))
        .await;

    for expected in 1..=3 {
        let (status, body) = h
            .call(post(
                "/api/v1/sessions/u1",
                json!({
                    "session_summary": format!("Session notes {expected}"),
                    "session_date": "2024-05-01T09:00:00Z"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["session_number"], expected);
        assert_eq!(body["session_id"], format!("u1_session_{expected}"));
        assert_eq!(body["session_date"], "2024-05-01T09:00:00Z");
        assert!(!body["episode_uuid"].as_str().unwrap().is_empty());
    }

    h.gateway.drain_link_tasks().await;
    assert_eq!(h.graph.edges_of_kind(HAS_SESSION).await, 3);

    let episodes = h.graph.episodes("u1").await;
    assert_eq!(episodes[2].1, "Session 3 for Alice: Session notes 3");
}

#[tokio::test]
async fn session_with_engine_without_ids_reports_unknown() {
    let h = Harness::new();
    h.engine.withhold_episode_ids();

    let (status, body) = h
        .call(post("/api/v1/sessions/u1", json!({ "session_summary": "notes" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["episode_uuid"], "unknown");
}

#[tokio::test]
async fn session_engine_failure_is_400() {
    let h = Harness::new();
    h.call(post("/api/v1/users", json!({ "user_id": "u1", "user_name": "Alice" })))
        .await;
    h.engine.set_unavailable(true);

    let (status, body) = h
        .call(post("/api/v1/sessions/u1", json!({ "session_summary": "notes" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Error adding session");
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn oversized_summary_is_422() {
    let h = Harness::new();
    let summary = "x".repeat(50_001);

    let (status, _) = h
        .call(post("/api/v1/sessions/u1", json!({ "session_summary": summary })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ═══════════════════════════════════════════════════════════════════════
// Deletion
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn delete_user_lifecycle() {
    let h = Harness::new();

    let (status, body) = h.call(delete("/api/v1/users/u1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No data found for user u1");
    assert_eq!(body["code"], "NO_DATA_FOUND");

    h.call(post("/api/v1/users", json!({ "user_id": "u1", "user_name": "Alice" })))
        .await;
    h.call(post("/api/v1/sessions/u1", json!({ "session_summary": "notes" })))
        .await;
    h.gateway.drain_link_tasks().await;

    let (status, body) = h.call(delete("/api/v1/users/u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["deleted_nodes"], 2);
    assert_eq!(body["deleted_relationships"], 1);
    assert_eq!(body["message"], "Successfully deleted all data for user u1");

    let (status, _) = h.call(get("/api/v1/users/u1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn numbering_restarts_after_delete_with_queued_ingestion() {
    let h = Harness::new();
    h.engine.defer_ingestion();

    let (_, first) = h
        .call(post("/api/v1/sessions/u1", json!({ "session_summary": "one" })))
        .await;
    let (_, second) = h
        .call(post("/api/v1/sessions/u1", json!({ "session_summary": "two" })))
        .await;
    assert_eq!(first["session_number"], 1);
    assert_eq!(second["session_number"], 2);

    h.engine.flush_ingestion().await.unwrap();
    h.gateway.drain_link_tasks().await;

    let (status, _) = h.call(delete("/api/v1/users/u1")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, fresh) = h
        .call(post("/api/v1/sessions/u1", json!({ "session_summary": "again" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(fresh["session_number"], 1);
}

// ═══════════════════════════════════════════════════════════════════════
// Profile search
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn center_node_search_ranks_anchor_first() {
    let h = Harness::new();
    let anchor = "550e8400-e29b-41d4-a716-446655440000";
    let fact = |uuid: &str, text: &str| Fact {
        uuid: uuid.to_string(),
        fact: text.to_string(),
        valid_at: None,
        invalid_at: None,
    };
    h.engine.seed_fact("u1", None, fact("f1", "Alice worries about exams"));
    h.engine.seed_fact("u1", Some(anchor), fact("f2", "Alice talks to her sister"));

    let (status, plain) = h
        .call(post(
            "/api/v1/profile/search",
            json!({ "query": "worries", "user_id": "u1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plain["query"], "worries");
    assert_eq!(plain["count"], 1);

    let (status, centered) = h
        .call(post(
            "/api/v1/profile/search/center-node",
            json!({ "query": "worries", "user_id": "u1", "center_node_uuid": anchor }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(centered["count"], 2);
    assert_eq!(centered["results"][0]["uuid"], "f2");
}

#[tokio::test]
async fn blank_query_is_422() {
    let h = Harness::new();
    let (status, body) = h
        .call(post("/api/v1/profile/search", json!({ "query": "", "user_id": "u1" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().starts_with("query"));
}

// ═══════════════════════════════════════════════════════════════════════
// Infrastructure
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn health_flips_with_graph_availability() {
    let h = Harness::new();

    let (status, body) = h.call(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["graph-engine"], "connected");

    h.graph.set_unavailable(true);
    let (status, body) = h.call(get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("graph database"));
}

#[tokio::test]
async fn panic_is_500_with_detail_only_in_debug() {
    let h = Harness::new();
    h.graph.set_panicking(true);

    let (status, body) = h.call(get("/api/v1/users/u1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert!(body.get("detail").is_none());

    errors::set_debug_mode(true);
    let (status, body) = h.call(get("/api/v1/users/u1")).await;
    errors::set_debug_mode(false);
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("panicked"));
}

#[tokio::test]
async fn responses_carry_process_time() {
    let h = Harness::new();
    let resp = h.app().oneshot(get("/")).await.unwrap();
    let header = resp.headers().get("x-process-time").unwrap();
    assert!(header.to_str().unwrap().parse::<f64>().is_ok());
}

#[tokio::test]
async fn metrics_endpoint_serves_text() {
    let _ = memorigraph::metrics::register_metrics();
    let h = Harness::new();
    h.call(get("/health")).await;

    let (status, body) = h.call(get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("memorigraph_http_requests_total"));
}
