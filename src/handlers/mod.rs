//! HTTP API Handlers
//!
//! Each submodule handles one area of the REST API; all of them go through
//! the shared [`MemoryGateway`].

// Core modules
pub mod router;
pub mod state;
pub mod types;

// Health and infrastructure
pub mod health;

// API areas
pub mod profile;
pub mod sessions;
pub mod users;

// Test utilities (compiled only in test builds)
#[cfg(test)]
pub mod test_helpers;

// Re-export commonly used items
pub use router::{build_api_routes, build_public_routes, build_router, AppState};
pub use state::MemoryGateway;
pub use types::*;
