//! User Management Handlers
//!
//! Create-or-fetch, lookup and full data deletion for a user identifier.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::router::AppState;
use super::types::{ApiJson, DeleteUserResponse, UserCreate, UserResponse};
use crate::errors::{AppError, ValidationErrorExt};
use crate::services::DeletionStatus;
use crate::validation;

/// POST /api/v1/users - Create a user, or return the one already stored
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    validation::validate_user_id(&req.user_id).map_validation_err("user_id")?;
    validation::validate_text("user_name", &req.user_name, validation::MAX_USER_NAME_LENGTH)
        .map_validation_err("user_name")?;

    let user = state
        .users
        .find_or_create(&req.user_name, &req.user_id)
        .await
        .map_err(AppError::upstream("creating user"))?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /api/v1/users/{user_id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    validation::validate_user_id(&user_id).map_validation_err("user_id")?;

    let user = state
        .users
        .find(&user_id)
        .await
        .map_err(AppError::upstream("retrieving user"))?
        .ok_or(AppError::UserNotFound(user_id))?;

    Ok(Json(UserResponse::from(user)))
}

/// DELETE /api/v1/users/{user_id} - Erase every node scoped to the user
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<DeleteUserResponse>, AppError> {
    validation::validate_user_id(&user_id).map_validation_err("user_id")?;

    let report = state
        .users
        .delete_all(&user_id)
        .await
        .map_err(AppError::upstream("deleting user data"))?;

    if report.status == DeletionStatus::NoDataFound {
        return Err(AppError::NoDataFound(user_id));
    }
    state.sessions.forget(&user_id).await;

    Ok(Json(DeleteUserResponse::from(report)))
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{delete, get, post_json, send, TestHarness};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_then_get() {
        let harness = TestHarness::new();

        let (status, created) = send(
            harness.router(),
            post_json("/api/v1/users", json!({ "user_id": "u1", "user_name": "Alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, fetched) = send(harness.router(), get("/api/v1/users/u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["uuid"], created["uuid"]);
        assert_eq!(fetched["user_name"], "Alice");
        assert_eq!(fetched["summary"], "User profile for Alice");
    }

    #[tokio::test]
    async fn test_unknown_user_is_404() {
        let harness = TestHarness::new();
        let (status, body) = send(harness.router(), get("/api/v1/users/ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User with ID ghost not found");

        let (status, _) = send(harness.router(), delete("/api/v1/users/ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_graph_failure_is_400_with_detail() {
        let harness = TestHarness::new();
        harness.graph.set_unavailable(true);

        let (status, body) = send(
            harness.router(),
            post_json("/api/v1/users", json!({ "user_id": "u1", "user_name": "Alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Error creating user");
        assert!(body["detail"].as_str().unwrap().contains("unavailable"));
    }
}
