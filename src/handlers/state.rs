//! Gateway State - adapters and services shared by every handler
//!
//! The graph store and knowledge engine are constructed once, injected here,
//! and closed explicitly at shutdown. Handlers never reach a backend except
//! through the services held by [`MemoryGateway`].

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::engine::{GraphitiEngine, KnowledgeEngine};
use crate::graph_store::{GraphStore, Neo4jStore, UserNode};
use crate::services::{ProfileService, SessionRecorder, UserService};

/// How long shutdown waits for in-flight session linking
const LINK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MemoryGateway {
    graph: Arc<dyn GraphStore>,
    engine: Arc<dyn KnowledgeEngine>,
    pub users: Arc<UserService>,
    pub sessions: SessionRecorder,
    pub profile: ProfileService,
    link_tasks: parking_lot::Mutex<JoinSet<()>>,
}

impl MemoryGateway {
    pub fn new(graph: Arc<dyn GraphStore>, engine: Arc<dyn KnowledgeEngine>) -> Self {
        Self {
            users: Arc::new(UserService::new(graph.clone(), engine.clone())),
            sessions: SessionRecorder::new(graph.clone(), engine.clone()),
            profile: ProfileService::new(engine.clone()),
            graph,
            engine,
            link_tasks: parking_lot::Mutex::new(JoinSet::new()),
        }
    }

    /// Gateway over Neo4j and a Graphiti-compatible engine.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            Arc::new(Neo4jStore::new(config.neo4j.clone())),
            Arc::new(GraphitiEngine::new(config.engine.clone())),
        )
    }

    /// Build both backend clients up front so misconfiguration fails at startup.
    pub fn initialize(&self) -> Result<()> {
        self.graph
            .initialize()
            .context("Failed to initialize graph database client")?;
        self.engine
            .initialize()
            .context("Failed to initialize knowledge engine client")?;
        Ok(())
    }

    /// Round-trip both backends; the error names the one that failed.
    pub async fn health(&self) -> Result<()> {
        self.engine
            .ping()
            .await
            .context("knowledge engine is not reachable")?;
        self.graph
            .ping()
            .await
            .context("graph database is not reachable")?;
        Ok(())
    }

    /// Link the user's sessions in the background.
    ///
    /// The outcome is reported through metrics; the request that triggered it
    /// never waits for or observes it.
    pub fn spawn_session_link(&self, user: UserNode, user_id: String) {
        let users = Arc::clone(&self.users);
        let mut tasks = self.link_tasks.lock();
        // Reap finished runs so the set only holds live tasks
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            users.link_sessions(&user, &user_id).await;
        });
    }

    /// Wait for every background linking task started so far.
    pub async fn drain_link_tasks(&self) {
        let mut tasks = std::mem::take(&mut *self.link_tasks.lock());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Session linking task aborted");
            }
        }
    }

    /// Finish background work, then close the engine and the graph client.
    ///
    /// Linking tasks get up to ten seconds to complete; any still running
    /// after that are aborted with a warning. Close failures are logged, never
    /// returned.
    pub async fn shutdown(&self) {
        if tokio::time::timeout(LINK_DRAIN_TIMEOUT, self.drain_link_tasks())
            .await
            .is_err()
        {
            warn!(
                "Session linking still running after {}s, aborting",
                LINK_DRAIN_TIMEOUT.as_secs()
            );
        }

        match self.engine.close().await {
            Ok(()) => info!("✅ Knowledge engine closed"),
            Err(e) => error!("❌ Failed to close knowledge engine: {}", e),
        }
        match self.graph.close().await {
            Ok(()) => info!("✅ Graph database connection closed"),
            Err(e) => error!("❌ Failed to close graph database connection: {}", e),
        }
    }
}
