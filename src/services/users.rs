//! User lifecycle: find-or-create, session linking, full deletion

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::KeyedLocks;
use crate::engine::KnowledgeEngine;
use crate::graph_store::{GraphStore, GraphTransaction, UserNode};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    Success,
    NoDataFound,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoDataFound => "no_data_found",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub user_id: String,
    pub deleted_nodes: u64,
    pub deleted_relationships: u64,
    pub status: DeletionStatus,
}

pub struct UserService {
    graph: Arc<dyn GraphStore>,
    engine: Arc<dyn KnowledgeEngine>,
    creation_locks: KeyedLocks,
}

impl UserService {
    pub fn new(graph: Arc<dyn GraphStore>, engine: Arc<dyn KnowledgeEngine>) -> Self {
        Self {
            graph,
            engine,
            creation_locks: KeyedLocks::new(),
        }
    }

    pub async fn find(&self, user_id: &str) -> Result<Option<UserNode>> {
        self.graph
            .find_user(user_id)
            .await
            .with_context(|| format!("Failed to look up user {user_id}"))
    }

    /// Return the User of `user_id`, creating it on first reference.
    ///
    /// An existing User is returned as stored even when `user_name` differs.
    pub async fn find_or_create(&self, user_name: &str, user_id: &str) -> Result<UserNode> {
        let _guard = self.creation_locks.lock(user_id).await;

        if let Some(existing) = self.find(user_id).await? {
            debug!(user_id = %user_id, uuid = %existing.uuid, "User already exists");
            return Ok(existing);
        }

        let mut user = UserNode::new(user_name, user_id);
        user.name_embedding = self
            .engine
            .embed(user_name)
            .await
            .context("Failed to embed user name")?;

        let stored = self
            .graph
            .create_user(&user)
            .await
            .with_context(|| format!("Failed to create user {user_id}"))?;
        info!(user_id = %user_id, uuid = %stored.uuid, "Created user");
        Ok(stored)
    }

    /// Link every unlinked session of `user_id` to `user`.
    ///
    /// Never fails: errors are logged, counted and reported as zero links.
    pub async fn link_sessions(&self, user: &UserNode, user_id: &str) -> u64 {
        match self.graph.link_sessions(&user.uuid, user_id).await {
            Ok(linked) => {
                metrics::record_session_link(if linked > 0 { "linked" } else { "noop" }, linked);
                debug!(user_id = %user_id, linked, "Linked sessions to user");
                linked
            }
            Err(e) => {
                metrics::record_session_link("failed", 0);
                warn!(user_id = %user_id, error = %e, "Failed to link sessions to user");
                0
            }
        }
    }

    /// Remove every node scoped to `user_id` and everything incident to it.
    ///
    /// Counting and deleting share one transaction; when nothing is scoped to
    /// the user the transaction is rolled back without issuing a delete.
    pub async fn delete_all(&self, user_id: &str) -> Result<DeletionReport> {
        let mut tx = self
            .graph
            .begin()
            .await
            .context("Failed to open deletion transaction")?;

        let counted = match tx.count_scoped(user_id).await {
            Ok(counts) => counts,
            Err(e) => {
                abandon(tx).await;
                return Err(e).context("Failed to count user data");
            }
        };

        if counted.is_empty() {
            tx.rollback()
                .await
                .context("Failed to close deletion transaction")?;
            metrics::record_user_deletion(DeletionStatus::NoDataFound.as_str());
            return Ok(DeletionReport {
                user_id: user_id.to_string(),
                deleted_nodes: 0,
                deleted_relationships: 0,
                status: DeletionStatus::NoDataFound,
            });
        }

        let removed = match tx.delete_scoped(user_id).await {
            Ok(counts) => counts,
            Err(e) => {
                abandon(tx).await;
                return Err(e).context("Failed to delete user data");
            }
        };
        tx.commit()
            .await
            .context("Failed to commit user deletion")?;

        metrics::record_user_deletion(DeletionStatus::Success.as_str());
        info!(
            user_id = %user_id,
            nodes = removed.nodes,
            relationships = removed.relationships,
            "Deleted all user data"
        );
        Ok(DeletionReport {
            user_id: user_id.to_string(),
            deleted_nodes: removed.nodes,
            deleted_relationships: removed.relationships,
            status: DeletionStatus::Success,
        })
    }
}

async fn abandon(tx: Box<dyn GraphTransaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback after failed deletion step also failed");
    }
}
