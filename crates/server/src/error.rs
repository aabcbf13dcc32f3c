//! Server error type and response mapping
//!
//! Taxonomy: validation problems are 400s thrown before any I/O, auth
//! failures are 401s, everything upstream (LLM, store, engine) surfaces as a
//! 500 with `{error, details}`. WhatsApp end users never see any of these;
//! they get the LLM reply or the static fallback phrase; this JSON is for
//! the webhook caller and internal services.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Send error: {0}")]
    Send(String),
}

impl From<coach_funnel::FunnelError> for ServerError {
    fn from(err: coach_funnel::FunnelError) -> Self {
        match err {
            coach_funnel::FunnelError::Validation(msg) => ServerError::Validation(msg),
            other => ServerError::Engine(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            ServerError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "Invalid request", Some(msg.clone()))
            }
            ServerError::Engine(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                Some(msg.clone()),
            ),
            ServerError::Send(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to deliver message",
                Some(msg.clone()),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = match details {
            Some(details) => json!({ "error": error, "details": details }),
            None => json!({ "error": error }),
        };
        (status, Json(body)).into_response()
    }
}
