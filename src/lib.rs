//! MemoriGraph Library
//!
//! HTTP API over a knowledge-graph memory engine and a graph database.
//!
//! # Key Features
//! - Users keyed by an external identifier that doubles as the graph partition
//! - Therapy sessions recorded as numbered episodes, serialized per user
//! - Profile facts through hybrid search, optionally reranked around a node
//! - Transactional count-then-delete of everything scoped to a user
//!
//! Backends sit behind [`graph_store::GraphStore`] and
//! [`engine::KnowledgeEngine`]; in-memory implementations of both back the
//! tests.

pub mod config;
pub mod engine;
pub mod errors;
pub mod graph_store;
pub mod handlers;
pub mod lazy;
pub mod metrics;
pub mod middleware;
pub mod services;
pub mod tracing_setup;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use chrono;
pub use uuid;
