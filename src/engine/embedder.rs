//! OpenAI-compatible embeddings client
//!
//! Used for entity name embeddings the service writes itself (the User node).
//! Any endpoint speaking the `/embeddings` wire format works via `base_url`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::{EngineError, EngineResult};
use crate::lazy::LazyClient;
use crate::metrics;

const SERVICE: &str = "embeddings";

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    config: EmbedderConfig,
    client: LazyClient<reqwest::Client>,
}

impl OpenAiEmbedder {
    pub fn new(config: EmbedderConfig) -> Self {
        Self {
            config,
            client: LazyClient::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn http(&self) -> EngineResult<Arc<reqwest::Client>> {
        self.client.get_or_try_init(|| {
            let client = reqwest::Client::builder().build()?;
            info!(model = %self.config.model, "Embedding client initialized");
            Ok::<_, EngineError>(client)
        })
    }

    pub async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let start = Instant::now();
        let result = self.request(text).await;
        metrics::record_engine_call("embed", result.is_ok(), start.elapsed().as_secs_f64());
        result
    }

    async fn request(&self, text: &str) -> EngineResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http()?
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Http {
                service: SERVICE,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| EngineError::Protocol {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| EngineError::Protocol {
                service: SERVICE,
                reason: "response carried no embedding".to_string(),
            })
    }

    pub fn close(&self) -> bool {
        self.client.close().is_some()
    }
}
