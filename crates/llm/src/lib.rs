//! LLM integration for the coach
//!
//! Features:
//! - OpenAI-compatible chat-completion backend over reqwest
//! - Per-stage prompt building in the assistant's Portuguese register
//! - Structured reply parsing (response text + automation actions)

pub mod backend;
pub mod prompt;
pub mod reply;

pub use backend::{FinishReason, GenerationResult, LlmBackend, OpenAIBackend, OpenAIConfig};
pub use prompt::{ClientMoment, Message, PromptBuilder, PromptContext, Role};
pub use reply::{AutomationAction, CoachReply};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for coach_core::Error {
    fn from(err: LlmError) -> Self {
        coach_core::Error::Llm(err.to_string())
    }
}
