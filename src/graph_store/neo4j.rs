//! Neo4j adapter over the HTTP transactional Cypher endpoint
//!
//! Single statements go to `/db/<database>/tx/commit` (auto-commit). Multi-step
//! work opens `/db/<database>/tx`, posts statements to the returned transaction
//! URL and finishes with `<tx>/commit` or `DELETE <tx>`.
//!
//! Neo4j reports Cypher failures inside a 200/201 body (`errors` array), so every
//! response is checked for both HTTP status and embedded errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{
    parse_db_date, GraphError, GraphResult, GraphStore, GraphTransaction, ScopeCounts, UserNode,
};
use crate::lazy::LazyClient;
use crate::metrics;

const FIND_USER: &str = "\
MATCH (user:Entity {group_id: $group_id})
WHERE 'User' IN labels(user)
RETURN user.uuid AS uuid, user.name AS name, toString(user.created_at) AS created_at,
       user.summary AS summary
LIMIT 1";

const CREATE_USER: &str = "\
MERGE (user:Entity:User {group_id: $group_id})
ON CREATE SET user:Person,
              user.uuid = $uuid,
              user.name = $name,
              user.summary = $summary,
              user.created_at = datetime($created_at),
              user.name_embedding = $name_embedding,
              user.type = 'User',
              user.user_id = $group_id
RETURN user.uuid AS uuid, user.name AS name, toString(user.created_at) AS created_at,
       user.summary AS summary";

const COUNT_SESSIONS: &str = "\
MATCH (session:Episodic {group_id: $group_id})
RETURN count(session) AS session_count";

const LINK_SESSIONS: &str = "\
MATCH (user:Entity {uuid: $user_uuid})
MATCH (session:Episodic {group_id: $group_id})
WHERE NOT (user)-[:HAS_SESSION]->(session)
MERGE (user)-[link:HAS_SESSION]->(session)
ON CREATE SET link.created_at = datetime(), link.group_id = $group_id
RETURN count(session) AS linked_sessions";

const COUNT_SCOPED: &str = "\
MATCH (n) WHERE n.group_id = $group_id
OPTIONAL MATCH (n)-[r]-()
RETURN count(DISTINCT n) AS node_count, count(DISTINCT r) AS rel_count";

const DELETE_SCOPED: &str = "\
MATCH (n) WHERE n.group_id = $group_id
OPTIONAL MATCH (n)-[r]-()
WITH collect(DISTINCT n) AS nodes, count(DISTINCT r) AS rel_count
FOREACH (node IN nodes | DETACH DELETE node)
RETURN size(nodes) AS node_count, rel_count";

const PING: &str = "RETURN 1 AS ok";

/// Connection settings for the Neo4j HTTP endpoint.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// Base URL, e.g. `http://localhost:7474`
    pub url: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct CypherResponse {
    #[serde(default)]
    results: Vec<CypherResult>,
    #[serde(default)]
    errors: Vec<CypherError>,
    /// Present on transaction-opening responses
    #[serde(default)]
    commit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CypherResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<CypherRow>,
}

#[derive(Debug, Deserialize)]
struct CypherRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CypherError {
    code: String,
    message: String,
}

/// One result row addressed by column name.
struct Record(Map<String, Value>);

impl Record {
    fn str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    fn u64(&self, column: &str) -> GraphResult<u64> {
        self.0
            .get(column)
            .and_then(Value::as_u64)
            .ok_or_else(|| GraphError::Protocol(format!("missing integer column {column}")))
    }
}

/// Aggregating statements always yield exactly one row.
fn aggregate_row<'a>(records: &'a [Record], operation: &str) -> GraphResult<&'a Record> {
    records
        .first()
        .ok_or_else(|| GraphError::Protocol(format!("{operation} returned no row")))
}

impl CypherResponse {
    fn into_checked(self) -> GraphResult<Self> {
        match self.errors.into_iter().next() {
            Some(err) => Err(GraphError::Cypher {
                code: err.code,
                message: err.message,
            }),
            None => Ok(Self {
                errors: Vec::new(),
                ..self
            }),
        }
    }

    /// Records of the first (and, for our statements, only) result set.
    fn records(self) -> Vec<Record> {
        let Some(result) = self.results.into_iter().next() else {
            return Vec::new();
        };
        let columns = result.columns;
        result
            .data
            .into_iter()
            .map(|row| Record(columns.iter().cloned().zip(row.row).collect()))
            .collect()
    }
}

fn user_from_record(record: &Record, group_id: &str) -> GraphResult<UserNode> {
    let uuid = record
        .str("uuid")
        .ok_or_else(|| GraphError::Protocol("user node without uuid".to_string()))?;
    let created_at = record
        .str("created_at")
        .and_then(parse_db_date)
        .ok_or_else(|| GraphError::Protocol(format!("user {uuid} has no readable created_at")))?;

    Ok(UserNode {
        uuid: uuid.to_string(),
        name: record.str("name").unwrap_or("Unknown").to_string(),
        group_id: group_id.to_string(),
        created_at,
        summary: record.str("summary").map(str::to_string),
        name_embedding: Vec::new(),
    })
}

fn scope_counts(records: &[Record], operation: &str) -> GraphResult<ScopeCounts> {
    let row = aggregate_row(records, operation)?;
    Ok(ScopeCounts {
        nodes: row.u64("node_count")?,
        relationships: row.u64("rel_count")?,
    })
}

/// HTTP plumbing shared by the store and its transactions.
#[derive(Clone)]
struct Endpoint {
    http: Arc<reqwest::Client>,
    username: String,
    password: String,
}

impl Endpoint {
    async fn post(&self, url: &str, statements: &[Statement<'_>]) -> GraphResult<CypherResponse> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json;charset=UTF-8")
            .json(&json!({ "statements": statements }))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn delete(&self, url: &str) -> GraphResult<()> {
        let response = self
            .http
            .delete(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        Self::decode(response).await.map(|_| ())
    }

    async fn decode(response: reqwest::Response) -> GraphResult<CypherResponse> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(CypherResponse {
                results: Vec::new(),
                errors: Vec::new(),
                commit: None,
            });
        }
        serde_json::from_slice::<CypherResponse>(&bytes)
            .map_err(|e| GraphError::Protocol(e.to_string()))?
            .into_checked()
    }
}

pub struct Neo4jStore {
    config: Neo4jConfig,
    client: LazyClient<reqwest::Client>,
}

impl Neo4jStore {
    pub fn new(config: Neo4jConfig) -> Self {
        Self {
            config,
            client: LazyClient::new(),
        }
    }

    fn endpoint(&self) -> GraphResult<Endpoint> {
        let http = self.client.get_or_try_init(|| {
            let client = reqwest::Client::builder().build()?;
            info!(url = %self.config.url, database = %self.config.database, "Neo4j client initialized");
            Ok::<_, GraphError>(client)
        })?;
        Ok(Endpoint {
            http,
            username: self.config.username.clone(),
            password: self.config.password.clone(),
        })
    }

    fn tx_url(&self) -> String {
        format!(
            "{}/db/{}/tx",
            self.config.url.trim_end_matches('/'),
            self.config.database
        )
    }

    /// Run one statement in an auto-commit transaction.
    async fn run(&self, operation: &'static str, statement: Statement<'_>) -> GraphResult<Vec<Record>> {
        let start = Instant::now();
        let url = format!("{}/commit", self.tx_url());
        let result = match self.endpoint() {
            Ok(endpoint) => endpoint.post(&url, &[statement]).await,
            Err(e) => Err(e),
        };
        metrics::record_graph_query(operation, result.is_ok(), start.elapsed().as_secs_f64());
        Ok(result?.records())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    fn initialize(&self) -> GraphResult<()> {
        self.endpoint().map(|_| ())
    }

    async fn find_user(&self, group_id: &str) -> GraphResult<Option<UserNode>> {
        let records = self
            .run(
                "find_user",
                Statement {
                    statement: FIND_USER,
                    parameters: json!({ "group_id": group_id }),
                },
            )
            .await?;

        records
            .first()
            .map(|record| user_from_record(record, group_id))
            .transpose()
    }

    async fn create_user(&self, user: &UserNode) -> GraphResult<UserNode> {
        let records = self
            .run(
                "create_user",
                Statement {
                    statement: CREATE_USER,
                    parameters: json!({
                        "group_id": user.group_id,
                        "uuid": user.uuid,
                        "name": user.name,
                        "summary": user.summary,
                        "created_at": user.created_at.to_rfc3339(),
                        "name_embedding": user.name_embedding,
                    }),
                },
            )
            .await?;

        let record = records
            .first()
            .ok_or_else(|| GraphError::Protocol("user merge returned no row".to_string()))?;
        user_from_record(record, &user.group_id)
    }

    async fn count_sessions(&self, group_id: &str) -> GraphResult<u64> {
        let records = self
            .run(
                "count_sessions",
                Statement {
                    statement: COUNT_SESSIONS,
                    parameters: json!({ "group_id": group_id }),
                },
            )
            .await?;
        aggregate_row(&records, "count_sessions")?.u64("session_count")
    }

    async fn link_sessions(&self, user_uuid: &str, group_id: &str) -> GraphResult<u64> {
        let records = self
            .run(
                "link_sessions",
                Statement {
                    statement: LINK_SESSIONS,
                    parameters: json!({ "user_uuid": user_uuid, "group_id": group_id }),
                },
            )
            .await?;
        aggregate_row(&records, "link_sessions")?.u64("linked_sessions")
    }

    async fn begin(&self) -> GraphResult<Box<dyn GraphTransaction>> {
        let endpoint = self.endpoint()?;
        let opened = endpoint.post(&self.tx_url(), &[]).await?;
        let commit_url = opened
            .commit
            .ok_or_else(|| GraphError::Protocol("transaction opened without commit URL".to_string()))?;
        let tx_url = commit_url
            .strip_suffix("/commit")
            .ok_or_else(|| GraphError::Protocol(format!("unexpected commit URL {commit_url}")))?
            .to_string();

        debug!(tx = %tx_url, "Opened graph transaction");
        Ok(Box::new(Neo4jTransaction {
            endpoint,
            tx_url,
            commit_url,
        }))
    }

    async fn ping(&self) -> GraphResult<()> {
        self.run(
            "ping",
            Statement {
                statement: PING,
                parameters: json!({}),
            },
        )
        .await
        .map(|_| ())
    }

    async fn close(&self) -> GraphResult<()> {
        if self.client.close().is_some() {
            info!("Neo4j client closed");
        }
        Ok(())
    }
}

pub struct Neo4jTransaction {
    endpoint: Endpoint,
    tx_url: String,
    commit_url: String,
}

impl Neo4jTransaction {
    async fn scoped(&self, operation: &'static str, statement: &str, group_id: &str) -> GraphResult<ScopeCounts> {
        let start = Instant::now();
        let result = self
            .endpoint
            .post(
                &self.tx_url,
                &[Statement {
                    statement,
                    parameters: json!({ "group_id": group_id }),
                }],
            )
            .await;
        metrics::record_graph_query(operation, result.is_ok(), start.elapsed().as_secs_f64());
        scope_counts(&result?.records(), operation)
    }
}

#[async_trait]
impl GraphTransaction for Neo4jTransaction {
    async fn count_scoped(&mut self, group_id: &str) -> GraphResult<ScopeCounts> {
        self.scoped("count_scoped", COUNT_SCOPED, group_id).await
    }

    async fn delete_scoped(&mut self, group_id: &str) -> GraphResult<ScopeCounts> {
        self.scoped("delete_scoped", DELETE_SCOPED, group_id).await
    }

    async fn commit(self: Box<Self>) -> GraphResult<()> {
        self.endpoint.post(&self.commit_url, &[]).await.map(|_| ())
    }

    async fn rollback(self: Box<Self>) -> GraphResult<()> {
        self.endpoint.delete(&self.tx_url).await
    }
}
