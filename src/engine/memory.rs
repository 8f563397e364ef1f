//! In-process knowledge engine
//!
//! Records episodes as `Episodic` nodes in an [`InMemoryGraph`] and answers
//! searches from facts seeded by the caller, ranked by query-term overlap.
//! Center-node searches put facts anchored at that node first.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{
    EngineError, EngineResult, EpisodeReceipt, EpisodeRequest, Fact, KnowledgeEngine,
    SearchRequest,
};
use crate::graph_store::InMemoryGraph;

const SERVICE: &str = "in-memory engine";
const EMBEDDING_DIM: usize = 8;

struct SeededFact {
    group_id: String,
    anchor: Option<String>,
    fact: Fact,
}

pub struct InMemoryEngine {
    graph: Arc<InMemoryGraph>,
    facts: RwLock<Vec<SeededFact>>,
    episodes: RwLock<Vec<EpisodeRequest>>,
    assign_episode_ids: AtomicBool,
    defer_ingestion: AtomicBool,
    queued: RwLock<Vec<EpisodeRequest>>,
    unavailable: AtomicBool,
}

impl InMemoryEngine {
    pub fn new(graph: Arc<InMemoryGraph>) -> Self {
        Self {
            graph,
            facts: RwLock::new(Vec::new()),
            episodes: RwLock::new(Vec::new()),
            assign_episode_ids: AtomicBool::new(true),
            defer_ingestion: AtomicBool::new(false),
            queued: RwLock::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make a fact searchable within `group_id`, optionally anchored to a node.
    pub fn seed_fact(&self, group_id: &str, anchor: Option<&str>, fact: Fact) {
        self.facts.write().push(SeededFact {
            group_id: group_id.to_string(),
            anchor: anchor.map(str::to_string),
            fact,
        });
    }

    /// Stop reporting episode identifiers, like an engine that queues ingestion.
    pub fn withhold_episode_ids(&self) {
        self.assign_episode_ids.store(false, Ordering::SeqCst);
    }

    /// Accept episodes without storing them until [`Self::flush_ingestion`],
    /// like an engine that ingests from a background queue.
    pub fn defer_ingestion(&self) {
        self.defer_ingestion.store(true, Ordering::SeqCst);
    }

    /// Store every queued episode in the graph.
    pub async fn flush_ingestion(&self) -> EngineResult<()> {
        let queued = std::mem::take(&mut *self.queued.write());
        for episode in &queued {
            self.store(episode).await?;
        }
        Ok(())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every episode submitted so far, in order.
    pub fn submitted_episodes(&self) -> Vec<EpisodeRequest> {
        self.episodes.read().clone()
    }

    async fn store(&self, episode: &EpisodeRequest) -> EngineResult<String> {
        self.graph
            .add_episode(
                &episode.group_id,
                &episode.name,
                &episode.episode_body,
                episode.reference_time,
            )
            .await
            .map_err(|e| EngineError::Protocol {
                service: SERVICE,
                reason: e.to_string(),
            })
    }

    fn check_available(&self) -> EngineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::Http {
                service: SERVICE,
                status: 503,
                body: "engine unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn overlap(query_terms: &[String], text: &str) -> usize {
    let text = text.to_lowercase();
    query_terms.iter().filter(|t| text.contains(t.as_str())).count()
}

#[async_trait]
impl KnowledgeEngine for InMemoryEngine {
    fn initialize(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        self.check_available()?;
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % EMBEDDING_DIM] += f32::from(byte) / 255.0;
        }
        Ok(vector)
    }

    async fn add_episode(&self, episode: &EpisodeRequest) -> EngineResult<EpisodeReceipt> {
        self.check_available()?;
        let uuid = if self.defer_ingestion.load(Ordering::SeqCst) {
            self.queued.write().push(episode.clone());
            uuid::Uuid::new_v4().to_string()
        } else {
            self.store(episode).await?
        };
        self.episodes.write().push(episode.clone());

        let episode_uuid = self.assign_episode_ids.load(Ordering::SeqCst).then_some(uuid);
        Ok(EpisodeReceipt { episode_uuid })
    }

    async fn search(&self, request: &SearchRequest) -> EngineResult<Vec<Fact>> {
        self.check_available()?;
        let terms: Vec<String> = request
            .query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let facts = self.facts.read();
        let mut scored: Vec<(bool, usize, &Fact)> = facts
            .iter()
            .filter(|s| request.group_ids.is_empty() || request.group_ids.contains(&s.group_id))
            .map(|s| {
                let anchored = request.center_node_uuid.is_some()
                    && s.anchor.as_deref() == request.center_node_uuid.as_deref();
                (anchored, overlap(&terms, &s.fact.fact), &s.fact)
            })
            .filter(|(anchored, score, _)| *anchored || *score > 0)
            .collect();

        // Stable sort keeps seeding order among equals.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        Ok(scored.into_iter().map(|(_, _, f)| f.clone()).collect())
    }

    async fn ping(&self) -> EngineResult<()> {
        self.check_available()
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(uuid: &str, text: &str) -> Fact {
        Fact {
            uuid: uuid.to_string(),
            fact: text.to_string(),
            valid_at: None,
            invalid_at: None,
        }
    }

    fn search(query: &str, center: Option<&str>) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            group_ids: vec!["u1".to_string()],
            center_node_uuid: center.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_search_scopes_and_ranks() {
        let engine = InMemoryEngine::new(Arc::new(InMemoryGraph::new()));
        engine.seed_fact("u1", None, fact("a", "Alice has trouble with sleep"));
        engine.seed_fact("u1", Some("mom"), fact("b", "Alice argues with her mother about sleep schedule"));
        engine.seed_fact("u2", None, fact("c", "Bob sleep apnea"));

        let plain = engine.search(&search("sleep schedule", None)).await.unwrap();
        assert_eq!(plain.iter().map(|f| f.uuid.as_str()).collect::<Vec<_>>(), ["b", "a"]);

        let centered = engine.search(&search("trouble", Some("mom"))).await.unwrap();
        assert_eq!(centered[0].uuid, "b");
    }

    #[tokio::test]
    async fn test_episode_lands_in_graph() {
        let graph = Arc::new(InMemoryGraph::new());
        let engine = InMemoryEngine::new(graph.clone());
        let receipt = engine
            .add_episode(&EpisodeRequest {
                name: "Therapy Session 1".to_string(),
                episode_body: "body".to_string(),
                source: crate::engine::EpisodeSource::Text,
                source_description: "therapy session summary".to_string(),
                reference_time: chrono::Utc::now(),
                group_id: "u1".to_string(),
            })
            .await
            .unwrap();

        assert!(receipt.episode_uuid.is_some());
        assert_eq!(graph.episodes("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_deferred_episodes_land_on_flush() {
        let graph = Arc::new(InMemoryGraph::new());
        let engine = InMemoryEngine::new(graph.clone());
        engine.defer_ingestion();

        let receipt = engine
            .add_episode(&EpisodeRequest {
                name: "Therapy Session 1".to_string(),
                episode_body: "body".to_string(),
                source: crate::engine::EpisodeSource::Text,
                source_description: "therapy session summary".to_string(),
                reference_time: chrono::Utc::now(),
                group_id: "u1".to_string(),
            })
            .await
            .unwrap();
        assert!(receipt.episode_uuid.is_some());
        assert!(graph.episodes("u1").await.is_empty());

        engine.flush_ingestion().await.unwrap();
        assert_eq!(graph.episodes("u1").await.len(), 1);
    }
}
