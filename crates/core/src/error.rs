//! Shared error type for the coach backend

use thiserror::Error;

/// Top-level error for cross-crate propagation
#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Integration error: {0}")]
    Integration(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Funnel error: {0}")]
    Funnel(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
