//! Raw WhatsApp message log
//!
//! Keyed by the raw phone string as received from the webhook, before
//! normalization, so rows exist even for phones that never match a profile.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// One inbound webhook message
#[derive(Debug, Clone)]
pub struct WhatsAppMessageRecord {
    pub phone: String,
    pub message: String,
    pub event: String,
    pub received_at: DateTime<Utc>,
}

impl WhatsAppMessageRecord {
    pub fn inbound(phone: impl Into<String>, message: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            message: message.into(),
            event: event.into(),
            received_at: Utc::now(),
        }
    }
}

/// Append-only message log
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(&self, record: &WhatsAppMessageRecord) -> Result<(), PersistenceError>;

    /// Record an emergency-protocol hit for follow-up by the care team
    async fn append_emergency(
        &self,
        phone: &str,
        user_id: Option<Uuid>,
        message: &str,
    ) -> Result<(), PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaMessageLog {
    client: ScyllaClient,
}

impl ScyllaMessageLog {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageLog for ScyllaMessageLog {
    async fn append(&self, record: &WhatsAppMessageRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.whatsapp_messages (phone, received_at, message_id, message, event)
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &record.phone,
                    record.received_at.timestamp_millis(),
                    Uuid::new_v4(),
                    &record.message,
                    &record.event,
                ),
            )
            .await?;
        Ok(())
    }

    async fn append_emergency(
        &self,
        phone: &str,
        user_id: Option<Uuid>,
        message: &str,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.emergency_alerts (phone, created_at, alert_id, user_id, message_content)
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    phone,
                    Utc::now().timestamp_millis(),
                    Uuid::new_v4(),
                    user_id,
                    message,
                ),
            )
            .await?;

        tracing::warn!(phone = %phone, "emergency alert recorded");
        Ok(())
    }
}

/// In-memory message log
#[derive(Default)]
pub struct InMemoryMessageLog {
    log: DashMap<String, Vec<WhatsAppMessageRecord>>,
    emergencies: DashMap<String, Vec<String>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, phone: &str) -> usize {
        self.log.get(phone).map(|l| l.len()).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.log.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn emergency_count(&self, phone: &str) -> usize {
        self.emergencies.get(phone).map(|e| e.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&self, record: &WhatsAppMessageRecord) -> Result<(), PersistenceError> {
        self.log
            .entry(record.phone.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn append_emergency(
        &self,
        phone: &str,
        _user_id: Option<Uuid>,
        message: &str,
    ) -> Result<(), PersistenceError> {
        self.emergencies
            .entry(phone.to_string())
            .or_default()
            .push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_are_keyed_by_raw_phone() {
        let log = InMemoryMessageLog::new();
        log.append(&WhatsAppMessageRecord::inbound(
            "5511999999999@s.whatsapp.net",
            "oi",
            "messages.upsert",
        ))
        .await
        .unwrap();

        assert_eq!(log.count("5511999999999@s.whatsapp.net"), 1);
        assert_eq!(log.count("5511999999999"), 0);
    }
}
