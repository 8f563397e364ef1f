//! Graph Store Adapter
//!
//! Everything this service reads or writes directly in the graph database goes
//! through [`GraphStore`]. All operations are scoped by the partition key
//! (`group_id`), which is the externally supplied user identifier.
//!
//! Two implementations ship with the crate:
//! - [`neo4j::Neo4jStore`] talks to Neo4j over its HTTP transactional Cypher API
//! - [`memory::InMemoryGraph`] keeps the graph in process (tests, local runs)

pub mod memory;
pub mod neo4j;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::InMemoryGraph;
pub use neo4j::{Neo4jConfig, Neo4jStore};

/// The User entity that owns every session and extracted fact of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNode {
    /// Internal unique identifier assigned at creation
    pub uuid: String,
    /// Display name (not an identity key after creation)
    pub name: String,
    /// Partition key, equal to the external user identifier
    pub group_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Name embedding; only populated on the write path
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_embedding: Vec<f32>,
}

impl UserNode {
    /// Build a fresh User node for `user_id` with a new UUID and default summary.
    pub fn new(name: &str, user_id: &str) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            group_id: user_id.to_string(),
            created_at: Utc::now(),
            summary: Some(format!("User profile for {name}")),
            name_embedding: Vec::new(),
        }
    }
}

/// Node and relationship totals for one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScopeCounts {
    pub nodes: u64,
    pub relationships: u64,
}

impl ScopeCounts {
    pub fn is_empty(&self) -> bool {
        self.nodes == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph database unreachable: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("graph database returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("{code}: {message}")]
    Cypher { code: String, message: String },

    #[error("unexpected graph response: {0}")]
    Protocol(String),

    #[error("graph store is closed")]
    Closed,
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Direct graph operations used by the user lifecycle and session workflows.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Construct the underlying client ahead of the first request.
    fn initialize(&self) -> GraphResult<()>;

    /// Look up the User entity of a partition.
    async fn find_user(&self, group_id: &str) -> GraphResult<Option<UserNode>>;

    /// Persist `user` unless a User already exists in its partition.
    ///
    /// Returns whichever User is stored afterwards, so two racing creators both
    /// observe the same entity.
    async fn create_user(&self, user: &UserNode) -> GraphResult<UserNode>;

    /// Number of session (episode) nodes in a partition.
    async fn count_sessions(&self, group_id: &str) -> GraphResult<u64>;

    /// Create a `HAS_SESSION` link from the user to every unlinked session of
    /// the partition. Returns the number of links created.
    async fn link_sessions(&self, user_uuid: &str, group_id: &str) -> GraphResult<u64>;

    /// Open an explicit transaction for multi-step mutations.
    async fn begin(&self) -> GraphResult<Box<dyn GraphTransaction>>;

    /// Round-trip a trivial query to prove the connection works.
    async fn ping(&self) -> GraphResult<()>;

    /// Drop the underlying client; a later call re-initializes it.
    async fn close(&self) -> GraphResult<()>;
}

/// One open transaction. Dropping it without `commit` leaves the server to
/// expire it, so callers should always `commit` or `rollback`.
#[async_trait]
pub trait GraphTransaction: Send {
    /// Count scoped nodes plus every relationship incident to them.
    async fn count_scoped(&mut self, group_id: &str) -> GraphResult<ScopeCounts>;

    /// Detach-delete every scoped node, returning what was removed.
    async fn delete_scoped(&mut self, group_id: &str) -> GraphResult<ScopeCounts>;

    async fn commit(self: Box<Self>) -> GraphResult<()>;

    async fn rollback(self: Box<Self>) -> GraphResult<()>;
}

/// Parse a temporal value as the graph database renders it.
///
/// Neo4j drops trailing zero seconds (`2024-05-01T09:30Z`) and may attach a
/// zone name in brackets, neither of which RFC 3339 accepts.
pub fn parse_db_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = match raw.find('[') {
        Some(idx) => &raw[..idx],
        None => raw,
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M%#z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    let naive = trimmed.trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(parsed.and_utc());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_new_user_defaults() {
        let user = UserNode::new("Alice", "u1");
        assert_eq!(user.group_id, "u1");
        assert_eq!(user.summary.as_deref(), Some("User profile for Alice"));
        assert!(uuid::Uuid::parse_str(&user.uuid).is_ok());
    }

    #[test]
    fn test_parse_db_date_variants() {
        let full = parse_db_date("2024-05-01T09:30:15.123456789Z").unwrap();
        assert_eq!(full.second(), 15);

        let short = parse_db_date("2024-05-01T09:30Z").unwrap();
        assert_eq!((short.hour(), short.minute(), short.second()), (9, 30, 0));

        let zoned = parse_db_date("2024-05-01T09:30:00+02:00[Europe/Berlin]").unwrap();
        assert_eq!(zoned.hour(), 7);

        let local = parse_db_date("2024-05-01T09:30:00").unwrap();
        assert_eq!(local.day(), 1);

        assert!(parse_db_date("yesterday").is_none());
    }
}
