//! Client for the Graphiti graph service (`graph_service` HTTP API)
//!
//! Wire contract:
//! - `POST /messages`: `{group_id, messages: [..]}`; the service answers 202
//!   and ingests in the background. Episode ids are assigned here and sent
//!   with the message, so a queued episode still has a known id.
//! - `POST /search`: `{group_ids, query, max_facts}`; replies `{"facts": [..]}`
//! - `GET  /healthcheck`
//!
//! Two extension fields ride along: `center_node_uuid` on searches and
//! `llm_model` on ingestion. The stock service ignores both; a center-node
//! search against it comes back in plain hybrid order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{
    EmbedderConfig, EngineError, EngineResult, EpisodeReceipt, EpisodeRequest, Fact,
    KnowledgeEngine, OpenAiEmbedder, SearchRequest,
};
use crate::lazy::LazyClient;
use crate::metrics;

const SERVICE: &str = "knowledge engine";

/// Facts requested per search when not configured; the service's own default.
pub const DEFAULT_MAX_FACTS: usize = 10;

#[derive(Debug, Clone)]
pub struct GraphitiConfig {
    pub base_url: String,
    /// Model the engine should extract with
    pub llm_model: String,
    /// Upper bound the engine applies to one search
    pub max_facts: usize,
    pub embedder: EmbedderConfig,
}

#[derive(Serialize)]
struct Message<'a> {
    uuid: &'a str,
    name: &'a str,
    content: &'a str,
    role_type: &'static str,
    role: Option<&'a str>,
    timestamp: DateTime<Utc>,
    source_description: &'a str,
}

#[derive(Serialize)]
struct AddMessages<'a> {
    group_id: &'a str,
    messages: [Message<'a>; 1],
    llm_model: &'a str,
}

#[derive(Serialize)]
struct SearchQuery<'a> {
    #[serde(flatten)]
    request: &'a SearchRequest,
    max_facts: usize,
}

#[derive(Deserialize)]
struct SearchResults {
    #[serde(default)]
    facts: Vec<Fact>,
}

pub struct GraphitiEngine {
    config: GraphitiConfig,
    client: LazyClient<reqwest::Client>,
    embedder: OpenAiEmbedder,
}

impl GraphitiEngine {
    pub fn new(config: GraphitiConfig) -> Self {
        let embedder = OpenAiEmbedder::new(config.embedder.clone());
        Self {
            config,
            client: LazyClient::new(),
            embedder,
        }
    }

    fn http(&self) -> EngineResult<Arc<reqwest::Client>> {
        self.client.get_or_try_init(|| {
            let client = reqwest::Client::builder().build()?;
            info!(
                url = %self.config.base_url,
                llm_model = %self.config.llm_model,
                max_facts = self.config.max_facts,
                embedding_model = %self.embedder.model(),
                "Knowledge engine client initialized"
            );
            Ok::<_, EngineError>(client)
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn check(response: reqwest::Response) -> EngineResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(EngineError::Http {
            service: SERVICE,
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn ingest(&self, episode: &EpisodeRequest) -> EngineResult<EpisodeReceipt> {
        let episode_uuid = uuid::Uuid::new_v4().to_string();
        let body = AddMessages {
            group_id: &episode.group_id,
            messages: [Message {
                uuid: &episode_uuid,
                name: &episode.name,
                content: &episode.episode_body,
                role_type: "user",
                role: None,
                timestamp: episode.reference_time,
                source_description: &episode.source_description,
            }],
            llm_model: &self.config.llm_model,
        };

        let response = self
            .http()?
            .post(self.url("/messages"))
            .json(&body)
            .send()
            .await?;
        // The body only acknowledges queueing.
        Self::check(response).await?;

        Ok(EpisodeReceipt {
            episode_uuid: Some(episode_uuid),
        })
    }

    async fn query(&self, request: &SearchRequest) -> EngineResult<Vec<Fact>> {
        let response = self
            .http()?
            .post(self.url("/search"))
            .json(&SearchQuery {
                request,
                max_facts: self.config.max_facts,
            })
            .send()
            .await?;
        let parsed: SearchResults = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Protocol {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        Ok(parsed.facts)
    }
}

#[async_trait]
impl KnowledgeEngine for GraphitiEngine {
    fn initialize(&self) -> EngineResult<()> {
        self.http()?;
        self.embedder.http()?;
        Ok(())
    }

    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        self.embedder.embed(text).await
    }

    async fn add_episode(&self, episode: &EpisodeRequest) -> EngineResult<EpisodeReceipt> {
        let start = Instant::now();
        let result = self.ingest(episode).await;
        metrics::record_engine_call("add_episode", result.is_ok(), start.elapsed().as_secs_f64());
        if let Ok(receipt) = &result {
            debug!(group_id = %episode.group_id, episode = ?receipt.episode_uuid, "Episode queued");
        }
        result
    }

    async fn search(&self, request: &SearchRequest) -> EngineResult<Vec<Fact>> {
        let start = Instant::now();
        let result = self.query(request).await;
        metrics::record_engine_call("search", result.is_ok(), start.elapsed().as_secs_f64());
        result
    }

    async fn ping(&self) -> EngineResult<()> {
        let response = self.http()?.get(self.url("/healthcheck")).send().await?;
        Self::check(response).await.map(|_| ())
    }

    async fn close(&self) -> EngineResult<()> {
        let engine_closed = self.client.close().is_some();
        let embedder_closed = self.embedder.close();
        if engine_closed || embedder_closed {
            info!("Knowledge engine clients closed");
        }
        Ok(())
    }
}
