//! Session Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use tracing::debug;

use super::router::AppState;
use super::types::{ApiJson, SessionCreate, SessionResponse};
use crate::errors::{AppError, ValidationErrorExt};
use crate::validation;

/// POST /api/v1/sessions/{user_id} - Record a session for a user
///
/// A user referenced here for the first time is created with a placeholder
/// name. Linking the session to the user happens in the background after the
/// response is built.
pub async fn create_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<SessionCreate>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    validation::validate_user_id(&user_id).map_validation_err("user_id")?;
    validation::validate_text(
        "session_summary",
        &req.session_summary,
        validation::MAX_SUMMARY_LENGTH,
    )
    .map_validation_err("session_summary")?;
    if let Some(n) = req.session_number {
        validation::validate_session_number(n).map_validation_err("session_number")?;
    }

    let session_date = req.session_date.unwrap_or_else(Utc::now);

    let user = match state
        .users
        .find(&user_id)
        .await
        .map_err(AppError::upstream("adding session"))?
    {
        Some(user) => user,
        None => {
            debug!(user_id = %user_id, "First session for unknown user, creating it");
            state
                .users
                .find_or_create(&format!("User_{user_id}"), &user_id)
                .await
                .map_err(AppError::upstream("adding session"))?
        }
    };

    let recorded = state
        .sessions
        .record(
            &req.session_summary,
            session_date,
            &user_id,
            &user.name,
            req.session_number,
        )
        .await
        .map_err(AppError::upstream("adding session"))?;

    state.spawn_session_link(user, user_id.clone());

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: format!("{user_id}_session_{}", recorded.session_number),
            session_number: recorded.session_number,
            session_date,
            episode_uuid: recorded.episode_uuid,
            message: format!("Session {} added successfully", recorded.session_number),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{post_json, send, TestHarness};
    use crate::graph_store::memory::HAS_SESSION;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_session_creates_placeholder_user() {
        let harness = TestHarness::new();

        let (status, body) = send(
            harness.router(),
            post_json("/api/v1/sessions/u7", json!({ "session_summary": "Discussed sleep." })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["session_number"], 1);
        assert_eq!(body["session_id"], "u7_session_1");
        assert_eq!(body["message"], "Session 1 added successfully");

        let episodes = harness.graph.episodes("u7").await;
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].0, "Therapy Session 1");
        assert_eq!(episodes[0].1, "Session 1 for User_u7: Discussed sleep.");

        harness.gateway.drain_link_tasks().await;
        assert_eq!(harness.graph.edges_of_kind(HAS_SESSION).await, 1);
    }

    #[tokio::test]
    async fn test_zero_session_number_rejected() {
        let harness = TestHarness::new();
        let (status, body) = send(
            harness.router(),
            post_json(
                "/api/v1/sessions/u1",
                json!({ "session_summary": "x", "session_number": 0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().starts_with("session_number"));
        assert_eq!(harness.graph.mutation_count(), 0);
    }
}
