//! Structured API errors
//!
//! Every failure leaves the service as `{"error": .., "code": .., "detail": ..}`
//! with a status taken from the error category. Upstream failures carry the
//! backend's message in `detail`; unexpected failures, panics included, only do
//! so in debug mode.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

/// Expose internal error messages in 500 responses.
pub fn set_debug_mode(enabled: bool) {
    DEBUG_MODE.store(enabled, Ordering::Relaxed);
}

fn debug_mode() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

/// Error body returned to API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,

    /// Machine-readable error code
    pub code: String,

    /// Additional error context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Application error types with proper categorization
#[derive(Debug)]
pub enum AppError {
    // Validation Errors (422)
    InvalidInput { field: String, reason: String },
    MalformedBody(String),

    // Not Found Errors (404)
    UserNotFound(String),
    NoDataFound(String),

    // Upstream Errors (400)
    Upstream {
        operation: &'static str,
        source: anyhow::Error,
    },

    // Generic wrapper for unexpected errors (500)
    Internal(anyhow::Error),
}

impl AppError {
    /// Wrap a failed graph or engine call.
    pub fn upstream(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Upstream { operation, source }
    }

    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::MalformedBody(_) => "MALFORMED_BODY",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::NoDataFound(_) => "NO_DATA_FOUND",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } | Self::MalformedBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UserNotFound(_) | Self::NoDataFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the client-facing message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { .. } | Self::MalformedBody(_) => "Validation error".to_string(),
            Self::UserNotFound(id) => format!("User with ID {id} not found"),
            Self::NoDataFound(id) => format!("No data found for user {id}"),
            Self::Upstream { operation, .. } => format!("Error {operation}"),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::InvalidInput { field, reason } => Some(format!("{field}: {reason}")),
            Self::MalformedBody(reason) => Some(reason.clone()),
            Self::Upstream { source, .. } => Some(format!("{source:#}")),
            Self::Internal(err) if debug_mode() => Some(format!("{err:#}")),
            _ => None,
        }
    }

    /// Convert to structured error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.message(),
            code: self.code().to_string(),
            detail: self.detail(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {detail}", self.message()),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for AppError {}

/// Convert from anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Axum IntoResponse implementation for proper HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Upstream { operation, source } => {
                warn!(operation = %operation, error = %format!("{source:#}"), "Upstream call failed");
            }
            Self::Internal(err) => error!(error = %format!("{err:#}"), "Unexpected error"),
            _ => {}
        }

        (status, Json(self.to_response())).into_response()
    }
}

/// Turn a panic raised while serving a request into a 500.
///
/// Installed through `CatchPanicLayer::custom`; the panic payload only reaches
/// the client in debug mode.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let reason = payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic payload".to_string());
    AppError::Internal(anyhow::anyhow!("Request handler panicked: {reason}")).into_response()
}

/// Helper trait to convert validation errors
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| AppError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;
