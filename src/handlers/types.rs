//! Request and response bodies, plus the JSON extractor all handlers use.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::engine::Fact;
use crate::errors::AppError;
use crate::graph_store::{parse_db_date, UserNode};
use crate::services::{DeletionReport, DeletionStatus};

/// `Json<T>` whose rejections are reported as 422 validation errors.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::MalformedBody(rejection.body_text())),
        }
    }
}

// =============================================================================
// USERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UserCreate {
    pub user_name: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: String,
    pub user_name: String,
    pub uuid: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl From<UserNode> for UserResponse {
    fn from(user: UserNode) -> Self {
        Self {
            user_id: user.group_id,
            user_name: user.name,
            uuid: user.uuid,
            created_at: user.created_at,
            summary: user.summary,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub user_id: String,
    pub deleted_nodes: u64,
    pub deleted_relationships: u64,
    pub status: DeletionStatus,
    pub message: String,
}

impl From<DeletionReport> for DeleteUserResponse {
    fn from(report: DeletionReport) -> Self {
        Self {
            message: format!("Successfully deleted all data for user {}", report.user_id),
            user_id: report.user_id,
            deleted_nodes: report.deleted_nodes,
            deleted_relationships: report.deleted_relationships,
            status: report.status,
        }
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionCreate {
    pub session_summary: String,
    /// Defaults to the time the request is handled
    #[serde(default, deserialize_with = "deserialize_session_date")]
    pub session_date: Option<DateTime<Utc>>,
    /// Defaults to one past the user's stored session count
    #[serde(default)]
    pub session_number: Option<u32>,
}

/// Accept RFC 3339 timestamps as well as offset-less ones, read as UTC.
fn deserialize_session_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_db_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid session_date: {raw}"))),
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub session_number: u32,
    pub session_date: DateTime<Utc>,
    pub episode_uuid: String,
    pub message: String,
}

// =============================================================================
// PROFILE SEARCH
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub query: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CenterNodeQuery {
    pub query: String,
    pub center_node_uuid: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct FactResult {
    pub uuid: String,
    pub fact: String,
    pub valid_at: Option<DateTime<Utc>>,
    pub invalid_at: Option<DateTime<Utc>>,
}

impl From<Fact> for FactResult {
    fn from(fact: Fact) -> Self {
        Self {
            uuid: fact.uuid,
            fact: fact.fact,
            valid_at: fact.valid_at,
            invalid_at: fact.invalid_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileQueryResponse {
    pub query: String,
    pub results: Vec<FactResult>,
    pub count: usize,
}

impl ProfileQueryResponse {
    pub fn new(query: String, facts: Vec<Fact>) -> Self {
        let results: Vec<FactResult> = facts.into_iter().map(FactResult::from).collect();
        Self {
            query,
            count: results.len(),
            results,
        }
    }
}

// =============================================================================
// HEALTH & INFO
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(rename = "graph-engine")]
    pub graph_engine: &'static str,
    #[serde(rename = "graph-storage")]
    pub graph_storage: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UnhealthyResponse {
    pub status: &'static str,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_date_formats() {
        let with_offset: SessionCreate = serde_json::from_str(
            r#"{"session_summary": "s", "session_date": "2024-05-01T09:00:00+02:00"}"#,
        )
        .unwrap();
        assert_eq!(
            with_offset.session_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap())
        );

        let naive: SessionCreate = serde_json::from_str(
            r#"{"session_summary": "s", "session_date": "2024-05-01T09:00:00"}"#,
        )
        .unwrap();
        assert_eq!(
            naive.session_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
        );

        let absent: SessionCreate = serde_json::from_str(r#"{"session_summary": "s"}"#).unwrap();
        assert!(absent.session_date.is_none());
        assert!(absent.session_number.is_none());

        assert!(serde_json::from_str::<SessionCreate>(
            r#"{"session_summary": "s", "session_date": "last tuesday"}"#
        )
        .is_err());
    }

    #[test]
    fn test_health_field_names() {
        let body = serde_json::to_value(HealthResponse {
            status: "healthy",
            graph_engine: "connected",
            graph_storage: "connected",
        })
        .unwrap();
        assert_eq!(body["graph-engine"], "connected");
        assert_eq!(body["graph-storage"], "connected");
    }

    #[test]
    fn test_deletion_message() {
        let response = DeleteUserResponse::from(DeletionReport {
            user_id: "u1".to_string(),
            deleted_nodes: 4,
            deleted_relationships: 3,
            status: DeletionStatus::Success,
        });
        assert_eq!(response.message, "Successfully deleted all data for user u1");
        assert_eq!(serde_json::to_value(&response).unwrap()["status"], "success");
    }
}
