//! External service clients
//!
//! Both remote collaborators stay opaque: the Evolution WhatsApp API and the
//! internal plan-generation service are reached through small reqwest clients
//! behind traits, so the funnel engine never sees HTTP.

pub mod evolution;
pub mod plan_service;

pub use evolution::{
    normalize_phone, phone_candidates, EvolutionClient, MessageData, MessageKey, MessageSender,
    WebhookEvent, MESSAGES_UPSERT,
};
pub use plan_service::{HttpPlanService, PlanGenerator};

use thiserror::Error;

/// Integration errors
#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        IntegrationError::Network(err.to_string())
    }
}

impl From<IntegrationError> for coach_core::Error {
    fn from(err: IntegrationError) -> Self {
        coach_core::Error::Integration(err.to_string())
    }
}
