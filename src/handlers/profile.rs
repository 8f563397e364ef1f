//! Profile Search Handlers

use axum::{extract::State, response::Json};

use super::router::AppState;
use super::types::{ApiJson, CenterNodeQuery, ProfileQuery, ProfileQueryResponse};
use crate::errors::{AppError, ValidationErrorExt};
use crate::validation;

/// POST /api/v1/profile/search - Hybrid search over a user's facts
pub async fn search_profile(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ProfileQuery>,
) -> Result<Json<ProfileQueryResponse>, AppError> {
    validation::validate_user_id(&req.user_id).map_validation_err("user_id")?;
    validation::validate_text("query", &req.query, validation::MAX_QUERY_LENGTH)
        .map_validation_err("query")?;

    let facts = state
        .profile
        .search(&req.query, &req.user_id, None)
        .await
        .map_err(AppError::upstream("searching profile"))?;

    Ok(Json(ProfileQueryResponse::new(req.query, facts)))
}

/// POST /api/v1/profile/search/center-node - Search reranked around a node
pub async fn search_profile_center_node(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CenterNodeQuery>,
) -> Result<Json<ProfileQueryResponse>, AppError> {
    validation::validate_user_id(&req.user_id).map_validation_err("user_id")?;
    validation::validate_text("query", &req.query, validation::MAX_QUERY_LENGTH)
        .map_validation_err("query")?;
    validation::validate_center_node_uuid(&req.center_node_uuid)
        .map_validation_err("center_node_uuid")?;

    let facts = state
        .profile
        .search(&req.query, &req.user_id, Some(&req.center_node_uuid))
        .await
        .map_err(AppError::upstream("searching profile with center node"))?;

    Ok(Json(ProfileQueryResponse::new(req.query, facts)))
}
