//! Configuration management for the coach backend
//!
//! Supports loading configuration from:
//! - YAML files (config/default.yaml, config/{env}.yaml)
//! - Environment variables (COACH_ prefix, `__` separator)
//!
//! Secrets (API keys, webhook secrets) are expected from the environment and
//! are only validated as present when running in a strict environment.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, FunnelSettings, LlmSettings, ObservabilityConfig, PersistenceConfig,
    PlanServiceSettings, ProactiveSettings, RuntimeEnvironment, ServerConfig, Settings,
    WhatsAppSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Missing required setting: {0}")]
    MissingRequired(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
