// Relay error types
// Every failure a request can hit, plus the HTTP status each one maps to

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Bearer token missing, expired, or rejected by the upstream (and not recoverable by refresh)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The nebulaONE API failed or could not be reached
    #[error("Upstream error{}: {message}", status_suffix(.status))]
    Upstream { status: Option<u16>, message: String },

    /// Missing or malformed configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Session limit reached ({0} active sessions)")]
    SessionLimit(usize),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl RelayError {
    pub fn upstream(message: impl Into<String>) -> Self {
        RelayError::Upstream {
            status: None,
            message: message.into(),
        }
    }

    pub fn missing_message() -> Self {
        RelayError::BadRequest("Missing \"message\" field in request body".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Auth(_) => StatusCode::UNAUTHORIZED,
            RelayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::SessionLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Config(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
