//! Router Configuration - Centralized route definitions
//!
//! Infrastructure routes live at the root; the API is versioned under
//! `/api/v1`.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use super::state::MemoryGateway;
use super::{health, profile, sessions, users};

/// Application state type alias
pub type AppState = Arc<MemoryGateway>;

/// Service info, health and metrics
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // SERVICE INFO & HEALTH
        // =================================================================
        .route("/", get(health::root))
        .route("/health", get(health::health))
        // =================================================================
        // METRICS (PROMETHEUS)
        // =================================================================
        .route("/metrics", get(health::metrics_endpoint))
        .with_state(state)
}

/// Versioned API routes, relative to `/api/v1`
pub fn build_api_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // USERS
        // =================================================================
        .route("/users", post(users::create_user))
        .route(
            "/users/{user_id}",
            get(users::get_user).delete(users::delete_user),
        )
        // =================================================================
        // SESSIONS
        // =================================================================
        .route("/sessions/{user_id}", post(sessions::create_session))
        // =================================================================
        // PROFILE SEARCH
        // =================================================================
        .route("/profile/search", post(profile::search_profile))
        .route(
            "/profile/search/center-node",
            post(profile::search_profile_center_node),
        )
        .with_state(state)
}

/// Full application router with request logging and metrics
///
/// Panics are caught inside the tracking layer so they are logged and counted
/// as 500s.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(build_public_routes(state.clone()))
        .nest("/api/v1", build_api_routes(state))
        .layer(CatchPanicLayer::custom(crate::errors::panic_response))
        .layer(axum::middleware::from_fn(crate::middleware::track_requests))
}
