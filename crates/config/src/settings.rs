//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{breaker, endpoints, llm, proactive, progression};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub whatsapp: WhatsAppSettings,

    #[serde(default)]
    pub plan_service: PlanServiceSettings,

    #[serde(default)]
    pub funnel: FunnelSettings,

    #[serde(default)]
    pub proactive: ProactiveSettings,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty list falls back to localhost
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Shared secret the Evolution webhook must present in its `apikey` header
    #[serde(default)]
    pub webhook_secret: String,

    /// Secret accepted in `X-Internal-Secret` for function-to-function calls
    #[serde(default)]
    pub internal_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_origins: Vec::new(),
            cors_enabled: true,
            webhook_secret: std::env::var("EVOLUTION_API_SECRET").unwrap_or_default(),
            internal_secret: std::env::var("INTERNAL_FUNCTION_SECRET").unwrap_or_default(),
        }
    }
}

/// OpenAI-compatible completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key; defaults from OPENAI_API_KEY
    #[serde(default = "default_openai_key")]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Ask for `response_format: json_object` so replies parse as actions
    #[serde(default = "default_true")]
    pub json_replies: bool,

    /// Circuit breaker threshold for completion calls
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// Circuit breaker open timeout in milliseconds
    #[serde(default = "default_breaker_timeout_ms")]
    pub breaker_timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: default_openai_key(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            json_replies: true,
            breaker_threshold: default_breaker_threshold(),
            breaker_timeout_ms: default_breaker_timeout_ms(),
        }
    }
}

/// Evolution WhatsApp API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppSettings {
    #[serde(default = "default_evolution_url")]
    pub base_url: String,

    #[serde(default = "default_evolution_instance")]
    pub instance_name: String,

    /// API key sent in the `apikey` header; defaults from EVOLUTION_API_KEY
    #[serde(default = "default_evolution_key")]
    pub api_key: String,

    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    #[serde(default = "default_breaker_timeout_ms")]
    pub breaker_timeout_ms: u64,
}

impl Default for WhatsAppSettings {
    fn default() -> Self {
        Self {
            base_url: default_evolution_url(),
            instance_name: default_evolution_instance(),
            api_key: default_evolution_key(),
            timeout_secs: default_send_timeout_secs(),
            breaker_threshold: default_breaker_threshold(),
            breaker_timeout_ms: default_breaker_timeout_ms(),
        }
    }
}

/// Internal plan-generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanServiceSettings {
    #[serde(default = "default_plan_service_url")]
    pub url: String,

    /// Bearer token for the internal call; defaults from PLAN_SERVICE_KEY
    #[serde(default = "default_plan_service_key")]
    pub service_key: String,

    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PlanServiceSettings {
    fn default() -> Self {
        Self {
            url: default_plan_service_url(),
            service_key: default_plan_service_key(),
            timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// Funnel progression thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelSettings {
    /// Seconds without recorded progress before advancement is forced
    #[serde(default = "default_stagnation_secs")]
    pub stagnation_timeout_secs: u64,

    /// Trailing identical questions that count as repetition
    #[serde(default = "default_repeat_window")]
    pub repeat_window: usize,

    /// Fraction of pillars covered before the specialist stage completes
    #[serde(default = "default_topic_coverage")]
    pub topic_coverage_threshold: f32,

    /// Conversation turns fed back into the prompt window
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for FunnelSettings {
    fn default() -> Self {
        Self {
            stagnation_timeout_secs: default_stagnation_secs(),
            repeat_window: default_repeat_window(),
            topic_coverage_threshold: default_topic_coverage(),
            history_window: default_history_window(),
        }
    }
}

/// Proactive engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-user-per-type cooldown window
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: i64,
}

impl Default for ProactiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_hours: default_cooldown_hours(),
        }
    }
}

/// Persistence configuration (ScyllaDB)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB persistence (false = in-memory only)
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_llm_endpoint() -> String {
    endpoints::OPENAI_DEFAULT.to_string()
}

fn default_openai_key() -> String {
    std::env::var("OPENAI_API_KEY").unwrap_or_default()
}

fn default_model() -> String {
    llm::MODEL.to_string()
}

fn default_temperature() -> f32 {
    llm::TEMPERATURE
}

fn default_max_tokens() -> usize {
    llm::MAX_TOKENS
}

fn default_llm_timeout_secs() -> u64 {
    llm::TIMEOUT_SECS
}

fn default_breaker_threshold() -> u32 {
    breaker::THRESHOLD
}

fn default_breaker_timeout_ms() -> u64 {
    breaker::OPEN_TIMEOUT_MS
}

fn default_evolution_url() -> String {
    std::env::var("EVOLUTION_BASE_URL").unwrap_or_else(|_| endpoints::EVOLUTION_DEFAULT.to_string())
}

fn default_evolution_instance() -> String {
    std::env::var("EVOLUTION_INSTANCE_NAME").unwrap_or_else(|_| "vida-smart".to_string())
}

fn default_evolution_key() -> String {
    std::env::var("EVOLUTION_API_KEY").unwrap_or_default()
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_plan_service_url() -> String {
    std::env::var("PLAN_SERVICE_URL").unwrap_or_else(|_| endpoints::PLAN_SERVICE_DEFAULT.to_string())
}

fn default_plan_service_key() -> String {
    std::env::var("PLAN_SERVICE_KEY").unwrap_or_default()
}

fn default_stagnation_secs() -> u64 {
    progression::STAGNATION_TIMEOUT_SECS
}

fn default_repeat_window() -> usize {
    progression::REPEAT_WINDOW
}

fn default_topic_coverage() -> f32 {
    progression::TOPIC_COVERAGE_THRESHOLD
}

fn default_history_window() -> usize {
    progression::HISTORY_WINDOW
}

fn default_cooldown_hours() -> i64 {
    proactive::COOLDOWN_HOURS
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "coach".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings, applying strict checks outside development
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }

        if self.llm.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.funnel.topic_coverage_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "funnel.topic_coverage_threshold".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    self.funnel.topic_coverage_threshold
                ),
            });
        }

        if self.funnel.repeat_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "funnel.repeat_window".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.proactive.cooldown_hours < 0 {
            return Err(ConfigError::InvalidValue {
                field: "proactive.cooldown_hours".to_string(),
                message: "Must not be negative".to_string(),
            });
        }

        // Configuration errors are fatal in strict environments: missing
        // secrets mean the service cannot talk to its dependencies at all.
        if self.environment.is_strict() {
            if self.llm.api_key.is_empty() {
                return Err(ConfigError::MissingRequired("llm.api_key".to_string()));
            }
            if self.whatsapp.api_key.is_empty() {
                return Err(ConfigError::MissingRequired("whatsapp.api_key".to_string()));
            }
            if self.server.webhook_secret.is_empty() {
                return Err(ConfigError::MissingRequired(
                    "server.webhook_secret".to_string(),
                ));
            }
            if self.plan_service.service_key.is_empty() {
                return Err(ConfigError::MissingRequired(
                    "plan_service.service_key".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Load settings from files and the environment.
///
/// Priority: env vars > config/{env}.yaml > config/default.yaml > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("COACH").separator("__"))
        .build()?;

    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_in_development() {
        let settings = Settings::default();
        assert_eq!(settings.environment, RuntimeEnvironment::Development);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn strict_mode_requires_secrets() {
        let settings = Settings {
            environment: RuntimeEnvironment::Production,
            llm: LlmSettings {
                api_key: String::new(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn out_of_range_thresholds_are_rejected() {
        let settings = Settings {
            funnel: FunnelSettings {
                topic_coverage_threshold: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn temperature_bounds() {
        let settings = Settings {
            llm: LlmSettings {
                temperature: 3.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
