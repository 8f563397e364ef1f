//! Profile search over the knowledge engine

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::engine::{Fact, KnowledgeEngine, SearchRequest};

pub struct ProfileService {
    engine: Arc<dyn KnowledgeEngine>,
}

impl ProfileService {
    pub fn new(engine: Arc<dyn KnowledgeEngine>) -> Self {
        Self { engine }
    }

    /// Hybrid search within one user's partition, in engine order.
    ///
    /// With `center_node_uuid` the engine reranks by graph distance from that
    /// node. Every fact the engine returns is surfaced; malformed ones are only
    /// logged.
    pub async fn search(
        &self,
        query: &str,
        user_id: &str,
        center_node_uuid: Option<&str>,
    ) -> Result<Vec<Fact>> {
        let request = SearchRequest {
            query: query.to_string(),
            group_ids: vec![user_id.to_string()],
            center_node_uuid: center_node_uuid.map(str::to_string),
        };

        let facts = self
            .engine
            .search(&request)
            .await
            .context("Profile search failed")?;

        let malformed = facts.iter().filter(|f| !f.is_well_formed()).count();
        if malformed > 0 {
            debug!(user_id = %user_id, malformed, "Engine returned malformed facts");
        }
        Ok(facts)
    }
}
