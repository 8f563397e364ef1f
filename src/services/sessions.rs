//! Session recording
//!
//! Each session becomes one episode in the knowledge engine, numbered within
//! the user's partition. Numbering and submission for one user are serialized
//! so concurrent requests never share a number.
//!
//! The engine may queue ingestion, in which case the stored episode count lags
//! behind what was submitted. The recorder keeps the highest number it issued
//! per user and never numbers below it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::KeyedLocks;
use crate::engine::{EpisodeRequest, EpisodeSource, KnowledgeEngine};
use crate::graph_store::GraphStore;
use crate::metrics;

pub const SESSION_SOURCE_DESCRIPTION: &str = "therapy session summary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSession {
    pub episode_uuid: String,
    pub session_number: u32,
}

pub fn episode_name(session_number: u32) -> String {
    format!("Therapy Session {session_number}")
}

/// Summary with a header naming the session and the person it is about, so
/// extraction attributes facts to the right user.
pub fn episode_body(session_number: u32, user_name: &str, summary: &str) -> String {
    format!("Session {session_number} for {user_name}: {summary}")
}

pub struct SessionRecorder {
    graph: Arc<dyn GraphStore>,
    engine: Arc<dyn KnowledgeEngine>,
    locks: KeyedLocks,
    /// Highest session number submitted per user
    issued: DashMap<String, u32>,
}

impl SessionRecorder {
    pub fn new(graph: Arc<dyn GraphStore>, engine: Arc<dyn KnowledgeEngine>) -> Self {
        Self {
            graph,
            engine,
            locks: KeyedLocks::new(),
            issued: DashMap::new(),
        }
    }

    pub async fn record(
        &self,
        summary: &str,
        timestamp: DateTime<Utc>,
        user_id: &str,
        user_name: &str,
        session_number: Option<u32>,
    ) -> Result<RecordedSession> {
        let _guard = self.locks.lock(user_id).await;

        let session_number = match session_number {
            Some(n) => n,
            None => self.next_session_number(user_id).await,
        };

        let episode = EpisodeRequest {
            name: episode_name(session_number),
            episode_body: episode_body(session_number, user_name, summary),
            source: EpisodeSource::Text,
            source_description: SESSION_SOURCE_DESCRIPTION.to_string(),
            reference_time: timestamp,
            group_id: user_id.to_string(),
        };

        let receipt = self
            .engine
            .add_episode(&episode)
            .await
            .with_context(|| format!("Failed to add session {session_number} for {user_id}"))?;
        let episode_uuid = receipt.episode_uuid_or_sentinel();

        self.issued
            .entry(user_id.to_string())
            .and_modify(|highest| *highest = (*highest).max(session_number))
            .or_insert(session_number);

        metrics::record_session_recorded();
        info!(
            user_id = %user_id,
            session_number,
            episode_uuid = %episode_uuid,
            "Recorded session"
        );
        Ok(RecordedSession {
            episode_uuid,
            session_number,
        })
    }

    /// Drop the numbering history of a user whose data was erased, so the
    /// next session starts again from the stored count.
    pub async fn forget(&self, user_id: &str) {
        let _guard = self.locks.lock(user_id).await;
        self.issued.remove(user_id);
    }

    /// One past the larger of the stored session count and the highest number
    /// already issued. Counting failures fall back to the issued number alone.
    async fn next_session_number(&self, user_id: &str) -> u32 {
        let issued = self.issued.get(user_id).map(|n| *n).unwrap_or(0);
        match self.graph.count_sessions(user_id).await {
            Ok(count) => u32::try_from(count)
                .unwrap_or(u32::MAX)
                .max(issued)
                .saturating_add(1),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Could not count sessions, numbering from {}",
                    issued.saturating_add(1)
                );
                issued.saturating_add(1)
            }
        }
    }
}
