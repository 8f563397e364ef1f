//! Shared test utilities for handler unit tests.
//!
//! Provides a [`TestHarness`] wiring a [`MemoryGateway`] to the in-memory graph
//! store and knowledge engine, plus helpers for building requests and reading
//! JSON response bodies.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tower::ServiceExt; // for oneshot()

use super::router::build_router;
use super::state::MemoryGateway;
use crate::engine::InMemoryEngine;
use crate::graph_store::InMemoryGraph;

/// A self-contained test environment with its own in-memory backends.
pub struct TestHarness {
    pub graph: Arc<InMemoryGraph>,
    pub engine: Arc<InMemoryEngine>,
    pub gateway: Arc<MemoryGateway>,
}

impl TestHarness {
    pub fn new() -> Self {
        let graph = Arc::new(InMemoryGraph::new());
        let engine = Arc::new(InMemoryEngine::new(graph.clone()));
        let gateway = Arc::new(MemoryGateway::new(graph.clone(), engine.clone()));
        Self {
            graph,
            engine,
            gateway,
        }
    }

    /// Build the full application router.
    pub fn router(&self) -> Router {
        build_router(self.gateway.clone())
    }
}

// ---------- Request builders ----------

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ---------- Response helpers ----------

/// Send a request through the router and return (status, JSON body).
pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body_bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&body_bytes).to_string())
        })
    };
    (status, json)
}
