//! OpenAI-compatible chat-completion backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::prompt::{Message, Role};
use crate::LlmError;

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
}

/// Result of a completion call
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub tokens: usize,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Completion backend seam; the engine only sees this trait so tests can
/// script replies without a network.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    fn model_name(&self) -> &str;
}

/// Configuration for OpenAI-compatible backends
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API endpoint (OpenAI: https://api.openai.com/v1)
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    /// Temperature (0-2)
    pub temperature: f32,
    pub timeout: Duration,
    /// Request `response_format: json_object` so the reply parses as a
    /// structured coach reply
    pub json_mode: bool,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 800,
            temperature: 0.8,
            timeout: Duration::from_secs(30),
            json_mode: true,
        }
    }
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &coach_config::LlmSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
            json_mode: settings.json_replies,
        }
    }
}

/// OpenAI-compatible backend
///
/// Works with OpenAI, Azure-style gateways and local servers exposing the
/// chat-completions surface.
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() && !config.endpoint.starts_with("http://localhost") {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();

        let openai_messages: Vec<OpenAIMessage> = messages
            .iter()
            .map(|m| OpenAIMessage {
                role: match m.role {
                    Role::System => "system".to_string(),
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect();

        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: openai_messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            response_format: if self.config.json_mode {
                Some(ResponseFormat {
                    format_type: "json_object".to_string(),
                })
            } else {
                None
            },
        };

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let total_time_ms = start.elapsed().as_millis() as u64;
        let tokens = response.usage.map(|u| u.completion_tokens).unwrap_or(0);

        tracing::debug!(
            model = %self.config.model,
            tokens,
            total_time_ms,
            "completion finished"
        );

        Ok(GenerationResult {
            text: choice.message.content.clone(),
            tokens,
            total_time_ms,
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// =============================================================================
// OpenAI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization_includes_json_mode() {
        let request = OpenAIChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: "oi".to_string(),
            }],
            max_tokens: Some(800),
            temperature: Some(0.8),
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("gpt-4o-mini"));
        assert!(json.contains(r#""response_format":{"type":"json_object"}"#));
    }

    #[test]
    fn response_parsing() {
        let json = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "Oi!"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }"#;

        let response: OpenAIChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content, "Oi!");
        assert_eq!(response.usage.unwrap().completion_tokens, 4);
    }

    #[test]
    fn missing_usage_is_tolerated() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "Oi!"}}]}"#;
        let response: OpenAIChatResponse = serde_json::from_str(json).unwrap();
        assert!(response.usage.is_none());
        assert!(response.choices[0].finish_reason.is_none());
    }

    #[test]
    fn remote_endpoint_requires_key() {
        let config = OpenAIConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(OpenAIBackend::new(config).is_err());

        let local = OpenAIConfig {
            api_key: String::new(),
            endpoint: "http://localhost:11434/v1".to_string(),
            ..Default::default()
        };
        assert!(OpenAIBackend::new(local).is_ok());
    }
}
