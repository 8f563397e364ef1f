//! In-process graph store
//!
//! Mirrors the Neo4j adapter's semantics on a plain node/edge list so the
//! lifecycle workflows and HTTP handlers can run without a database. A
//! transaction holds the whole graph lock and works on a staged copy, so
//! rollback discards and commit publishes atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{GraphError, GraphResult, GraphStore, GraphTransaction, ScopeCounts, UserNode};

pub const USER_LABEL: &str = "User";
pub const EPISODIC_LABEL: &str = "Episodic";
pub const HAS_SESSION: &str = "HAS_SESSION";

#[derive(Debug, Clone)]
pub struct StoredNode {
    pub uuid: String,
    pub labels: Vec<String>,
    pub group_id: Option<String>,
    pub name: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredNode {
    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    fn in_group(&self, group_id: &str) -> bool {
        self.group_id.as_deref() == Some(group_id)
    }

    fn to_user(&self) -> UserNode {
        UserNode {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            group_id: self.group_id.clone().unwrap_or_default(),
            created_at: self.created_at,
            summary: self.summary.clone(),
            name_embedding: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredEdge {
    pub uuid: String,
    pub kind: String,
    pub source: String,
    pub target: String,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct GraphData {
    nodes: Vec<StoredNode>,
    edges: Vec<StoredEdge>,
}

impl GraphData {
    fn scoped(&self, group_id: &str) -> HashSet<String> {
        self.nodes
            .iter()
            .filter(|n| n.in_group(group_id))
            .map(|n| n.uuid.clone())
            .collect()
    }

    fn count_scoped(&self, group_id: &str) -> ScopeCounts {
        let scoped = self.scoped(group_id);
        let relationships = self
            .edges
            .iter()
            .filter(|e| scoped.contains(&e.source) || scoped.contains(&e.target))
            .count();
        ScopeCounts {
            nodes: scoped.len() as u64,
            relationships: relationships as u64,
        }
    }

    fn delete_scoped(&mut self, group_id: &str) -> ScopeCounts {
        let counts = self.count_scoped(group_id);
        let scoped = self.scoped(group_id);
        self.edges
            .retain(|e| !scoped.contains(&e.source) && !scoped.contains(&e.target));
        self.nodes.retain(|n| !scoped.contains(&n.uuid));
        counts
    }

    fn user(&self, group_id: &str) -> Option<&StoredNode> {
        self.nodes
            .iter()
            .find(|n| n.in_group(group_id) && n.has_label(USER_LABEL))
    }
}

#[derive(Default)]
pub struct InMemoryGraph {
    data: Arc<Mutex<GraphData>>,
    mutations: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    panicking: Arc<AtomicBool>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, as if the database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every subsequent operation panic, standing in for a bug below the
    /// handlers.
    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }

    /// Number of mutating statements issued so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub async fn add_node(&self, labels: &[&str], group_id: &str, name: &str) -> String {
        let node = StoredNode {
            uuid: uuid::Uuid::new_v4().to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            group_id: Some(group_id.to_string()),
            name: name.to_string(),
            summary: None,
            content: None,
            created_at: Utc::now(),
        };
        let uuid = node.uuid.clone();
        self.data.lock().await.nodes.push(node);
        uuid
    }

    pub async fn add_edge(&self, kind: &str, source: &str, target: &str) -> String {
        let edge = StoredEdge {
            uuid: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            group_id: None,
        };
        let uuid = edge.uuid.clone();
        self.data.lock().await.edges.push(edge);
        uuid
    }

    /// Store an episode node the way the knowledge engine would.
    pub async fn add_episode(
        &self,
        group_id: &str,
        name: &str,
        content: &str,
        reference_time: DateTime<Utc>,
    ) -> GraphResult<String> {
        self.check_available()?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let node = StoredNode {
            uuid: uuid::Uuid::new_v4().to_string(),
            labels: vec![EPISODIC_LABEL.to_string()],
            group_id: Some(group_id.to_string()),
            name: name.to_string(),
            summary: None,
            content: Some(content.to_string()),
            created_at: reference_time,
        };
        let uuid = node.uuid.clone();
        self.data.lock().await.nodes.push(node);
        Ok(uuid)
    }

    pub async fn scoped_counts(&self, group_id: &str) -> ScopeCounts {
        self.data.lock().await.count_scoped(group_id)
    }

    pub async fn edges_of_kind(&self, kind: &str) -> usize {
        self.data
            .lock()
            .await
            .edges
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Episode bodies of a partition in insertion order.
    pub async fn episodes(&self, group_id: &str) -> Vec<(String, String)> {
        self.data
            .lock()
            .await
            .nodes
            .iter()
            .filter(|n| n.in_group(group_id) && n.has_label(EPISODIC_LABEL))
            .map(|n| (n.name.clone(), n.content.clone().unwrap_or_default()))
            .collect()
    }

    fn check_available(&self) -> GraphResult<()> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("in-memory graph asked to panic");
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::Http {
                status: 503,
                body: "graph database unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    fn initialize(&self) -> GraphResult<()> {
        Ok(())
    }

    async fn find_user(&self, group_id: &str) -> GraphResult<Option<UserNode>> {
        self.check_available()?;
        Ok(self.data.lock().await.user(group_id).map(StoredNode::to_user))
    }

    async fn create_user(&self, user: &UserNode) -> GraphResult<UserNode> {
        self.check_available()?;
        self.mutations.fetch_add(1, Ordering::SeqCst);

        let mut data = self.data.lock().await;
        if let Some(existing) = data.user(&user.group_id) {
            return Ok(existing.to_user());
        }

        let node = StoredNode {
            uuid: user.uuid.clone(),
            labels: vec!["Entity".to_string(), USER_LABEL.to_string(), "Person".to_string()],
            group_id: Some(user.group_id.clone()),
            name: user.name.clone(),
            summary: user.summary.clone(),
            content: None,
            created_at: user.created_at,
        };
        let stored = node.to_user();
        data.nodes.push(node);
        Ok(stored)
    }

    async fn count_sessions(&self, group_id: &str) -> GraphResult<u64> {
        self.check_available()?;
        let data = self.data.lock().await;
        Ok(data
            .nodes
            .iter()
            .filter(|n| n.in_group(group_id) && n.has_label(EPISODIC_LABEL))
            .count() as u64)
    }

    async fn link_sessions(&self, user_uuid: &str, group_id: &str) -> GraphResult<u64> {
        self.check_available()?;
        self.mutations.fetch_add(1, Ordering::SeqCst);

        let mut data = self.data.lock().await;
        if !data.nodes.iter().any(|n| n.uuid == user_uuid) {
            return Ok(0);
        }

        let linked: HashSet<String> = data
            .edges
            .iter()
            .filter(|e| e.kind == HAS_SESSION && e.source == user_uuid)
            .map(|e| e.target.clone())
            .collect();
        let unlinked: Vec<String> = data
            .nodes
            .iter()
            .filter(|n| n.in_group(group_id) && n.has_label(EPISODIC_LABEL))
            .filter(|n| !linked.contains(&n.uuid))
            .map(|n| n.uuid.clone())
            .collect();

        for session in &unlinked {
            data.edges.push(StoredEdge {
                uuid: uuid::Uuid::new_v4().to_string(),
                kind: HAS_SESSION.to_string(),
                source: user_uuid.to_string(),
                target: session.clone(),
                group_id: Some(group_id.to_string()),
            });
        }
        Ok(unlinked.len() as u64)
    }

    async fn begin(&self) -> GraphResult<Box<dyn GraphTransaction>> {
        self.check_available()?;
        let guard = Arc::clone(&self.data).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            staged,
            mutations: Arc::clone(&self.mutations),
        }))
    }

    async fn ping(&self) -> GraphResult<()> {
        self.check_available()
    }

    async fn close(&self) -> GraphResult<()> {
        Ok(())
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<GraphData>,
    staged: GraphData,
    mutations: Arc<AtomicUsize>,
}

#[async_trait]
impl GraphTransaction for InMemoryTransaction {
    async fn count_scoped(&mut self, group_id: &str) -> GraphResult<ScopeCounts> {
        Ok(self.staged.count_scoped(group_id))
    }

    async fn delete_scoped(&mut self, group_id: &str) -> GraphResult<ScopeCounts> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(self.staged.delete_scoped(group_id))
    }

    async fn commit(self: Box<Self>) -> GraphResult<()> {
        let InMemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> GraphResult<()> {
        Ok(())
    }
}
