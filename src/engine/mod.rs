//! Knowledge Engine Adapter
//!
//! The knowledge engine ingests narrative episodes, mines them for entities and
//! facts, and answers hybrid (BM25 + semantic) searches over what it extracted.
//! None of that happens here: [`KnowledgeEngine`] is the seam, and
//! [`graphiti::GraphitiEngine`] forwards to a Graphiti-compatible service.

pub mod embedder;
pub mod graphiti;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use embedder::{EmbedderConfig, OpenAiEmbedder};
pub use graphiti::{GraphitiConfig, GraphitiEngine};
pub use memory::InMemoryEngine;

/// Episode identifier reported when the engine does not return one.
pub const UNKNOWN_EPISODE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeSource {
    Text,
    Message,
    Json,
}

/// A unit of narrative text submitted for extraction.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeRequest {
    pub name: String,
    pub episode_body: String,
    pub source: EpisodeSource,
    pub source_description: String,
    pub reference_time: DateTime<Utc>,
    pub group_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeReceipt {
    pub episode_uuid: Option<String>,
}

impl EpisodeReceipt {
    pub fn episode_uuid_or_sentinel(self) -> String {
        self.episode_uuid
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| UNKNOWN_EPISODE.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    /// Partitions to search; empty means every partition
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_ids: Vec<String>,
    /// Rerank results by graph distance from this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_node_uuid: Option<String>,
}

/// A derived statement with its validity interval.
///
/// `valid_at: None` means no start was observed; `invalid_at: None` means the
/// fact is still considered valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub uuid: String,
    pub fact: String,
    #[serde(default)]
    pub valid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub invalid_at: Option<DateTime<Utc>>,
}

impl Fact {
    pub fn is_well_formed(&self) -> bool {
        if self.fact.trim().is_empty() || self.uuid.is_empty() {
            return false;
        }
        match (self.valid_at, self.invalid_at) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("knowledge engine unreachable: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected {service} response: {reason}")]
    Protocol {
        service: &'static str,
        reason: String,
    },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[async_trait]
pub trait KnowledgeEngine: Send + Sync {
    /// Construct the underlying clients ahead of the first request.
    fn initialize(&self) -> EngineResult<()>;

    /// Embedding of an entity name, stored alongside graph nodes.
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>>;

    async fn add_episode(&self, episode: &EpisodeRequest) -> EngineResult<EpisodeReceipt>;

    /// Hybrid search, returned in the engine's ranking order.
    async fn search(&self, request: &SearchRequest) -> EngineResult<Vec<Fact>>;

    async fn ping(&self) -> EngineResult<()>;

    /// Drop the underlying clients; a later call re-initializes them.
    async fn close(&self) -> EngineResult<()>;
}
