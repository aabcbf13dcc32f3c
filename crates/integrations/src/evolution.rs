//! Evolution WhatsApp API client and webhook payload types

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::IntegrationError;

/// The only webhook event the coach processes
pub const MESSAGES_UPSERT: &str = "messages.upsert";

/// Inbound webhook payload (Evolution shape)
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: Option<MessageData>,
    #[serde(default)]
    pub destination: Option<String>,
}

impl WebhookEvent {
    /// True when this event carries a user text message the coach should see
    pub fn is_processable(&self) -> bool {
        self.event == MESSAGES_UPSERT
            && self
                .data
                .as_ref()
                .is_some_and(|d| !d.key.from_me && d.text().is_some())
    }

    /// Raw sender identifier (`remoteJid` or the destination fallback)
    pub fn raw_phone(&self) -> Option<&str> {
        self.data
            .as_ref()
            .map(|d| d.key.remote_jid.as_str())
            .filter(|jid| !jid.is_empty())
            .or(self.destination.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageData {
    pub key: MessageKey,
    #[serde(default)]
    pub message: Option<MessageContent>,
}

impl MessageData {
    /// Text content of the message: plain conversation or extended text
    pub fn text(&self) -> Option<&str> {
        let message = self.message.as_ref()?;
        message
            .conversation
            .as_deref()
            .or_else(|| {
                message
                    .extended_text_message
                    .as_ref()
                    .map(|e| e.text.as_str())
            })
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageKey {
    #[serde(rename = "remoteJid", default)]
    pub remote_jid: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(rename = "extendedTextMessage", default)]
    pub extended_text_message: Option<ExtendedText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: String,
}

/// Canonical phone form: the WhatsApp JID suffix stripped, digits only.
/// `"5511999999999@s.whatsapp.net"` → `"5511999999999"`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let without_suffix = raw.split('@').next().unwrap_or(raw);
    let digits: String = without_suffix.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Lookup candidates for a raw phone: stored profiles are inconsistent about
/// the leading `+`, so both spellings are probed.
pub fn phone_candidates(raw: &str) -> Vec<String> {
    let Some(digits) = normalize_phone(raw) else {
        return Vec::new();
    };
    vec![digits.clone(), format!("+{}", digits)]
}

/// Outbound message seam; the webhook path only sees this trait
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, number: &str, text: &str) -> Result<(), IntegrationError>;
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

/// reqwest client for the Evolution send API
pub struct EvolutionClient {
    base_url: String,
    instance_name: String,
    api_key: String,
    client: Client,
}

impl EvolutionClient {
    pub fn new(settings: &coach_config::WhatsAppSettings) -> Result<Self, IntegrationError> {
        if settings.base_url.is_empty() {
            return Err(IntegrationError::Configuration(
                "Evolution base URL not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| IntegrationError::Network(e.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            instance_name: settings.instance_name.clone(),
            api_key: settings.api_key.clone(),
            client,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/message/sendText/{}", self.base_url, self.instance_name)
    }
}

#[async_trait]
impl MessageSender for EvolutionClient {
    async fn send_text(&self, number: &str, text: &str) -> Result<(), IntegrationError> {
        let response = self
            .client
            .post(self.send_url())
            .header("apikey", &self.api_key)
            .json(&SendTextRequest { number, text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(number = %number, chars = text.len(), "WhatsApp message sent");
        Ok(())
    }
}
