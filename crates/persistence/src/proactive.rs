//! Proactive message records and cooldown
//!
//! Each send is write-once; a later user reply flips `response_received` on
//! the most recent unanswered record. The cooldown check the managed
//! deployment does in a stored procedure is expressed here as a store query:
//! a message type is sendable when no record of that type exists inside the
//! cooldown window.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// One proactive send
#[derive(Debug, Clone)]
pub struct ProactiveRecord {
    pub user_id: Uuid,
    pub message_type: String,
    pub message_content: String,
    pub metadata: Value,
    pub sent_at: DateTime<Utc>,
    pub response_received: bool,
    pub response_at: Option<DateTime<Utc>>,
}

impl ProactiveRecord {
    pub fn new(
        user_id: Uuid,
        message_type: impl Into<String>,
        message_content: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            user_id,
            message_type: message_type.into(),
            message_content: message_content.into(),
            metadata,
            sent_at: Utc::now(),
            response_received: false,
            response_at: None,
        }
    }
}

/// Proactive message log + cooldown gate
#[async_trait]
pub trait ProactiveStore: Send + Sync {
    /// True when no message of this type was sent within the cooldown window
    async fn can_send(
        &self,
        user_id: Uuid,
        message_type: &str,
        cooldown: Duration,
    ) -> Result<bool, PersistenceError>;

    async fn record(&self, record: &ProactiveRecord) -> Result<(), PersistenceError>;

    /// Mark the most recent unanswered message as responded
    async fn mark_responded(&self, user_id: Uuid) -> Result<(), PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaProactiveStore {
    client: ScyllaClient,
}

impl ScyllaProactiveStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProactiveStore for ScyllaProactiveStore {
    async fn can_send(
        &self,
        user_id: Uuid,
        message_type: &str,
        cooldown: Duration,
    ) -> Result<bool, PersistenceError> {
        let since = (Utc::now() - cooldown).timestamp_millis();
        let query = format!(
            "SELECT message_type, sent_at FROM {}.proactive_messages
             WHERE user_id = ? AND sent_at >= ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, since))
            .await?;

        if let Some(rows) = result.rows {
            for row in rows {
                let (row_type, _sent_at): (String, i64) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                if row_type == message_type {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn record(&self, record: &ProactiveRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.proactive_messages
             (user_id, sent_at, message_id, message_type, message_content, metadata,
              response_received, response_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    record.user_id,
                    record.sent_at.timestamp_millis(),
                    Uuid::new_v4(),
                    &record.message_type,
                    &record.message_content,
                    record.metadata.to_string(),
                    record.response_received,
                    record.response_at.map(|at| at.timestamp_millis()),
                ),
            )
            .await?;

        tracing::info!(
            user_id = %record.user_id,
            message_type = %record.message_type,
            "proactive message recorded"
        );
        Ok(())
    }

    async fn mark_responded(&self, user_id: Uuid) -> Result<(), PersistenceError> {
        let query = format!(
            "SELECT sent_at, message_id, response_received FROM {}.proactive_messages
             WHERE user_id = ? LIMIT 10",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        if let Some(rows) = result.rows {
            for row in rows {
                let (sent_at, message_id, response_received): (i64, Uuid, bool) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                if !response_received {
                    let update = format!(
                        "UPDATE {}.proactive_messages
                         SET response_received = true, response_at = ?
                         WHERE user_id = ? AND sent_at = ? AND message_id = ?",
                        self.client.keyspace()
                    );
                    self.client
                        .session()
                        .query_unpaged(
                            update,
                            (Utc::now().timestamp_millis(), user_id, sent_at, message_id),
                        )
                        .await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// In-memory proactive log
#[derive(Default)]
pub struct InMemoryProactiveStore {
    log: DashMap<Uuid, Vec<ProactiveRecord>>,
}

impl InMemoryProactiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self, user_id: Uuid) -> Vec<ProactiveRecord> {
        self.log.get(&user_id).map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProactiveStore for InMemoryProactiveStore {
    async fn can_send(
        &self,
        user_id: Uuid,
        message_type: &str,
        cooldown: Duration,
    ) -> Result<bool, PersistenceError> {
        let since = Utc::now() - cooldown;
        Ok(self
            .log
            .get(&user_id)
            .map(|l| {
                !l.iter()
                    .any(|r| r.message_type == message_type && r.sent_at >= since)
            })
            .unwrap_or(true))
    }

    async fn record(&self, record: &ProactiveRecord) -> Result<(), PersistenceError> {
        self.log.entry(record.user_id).or_default().push(record.clone());
        Ok(())
    }

    async fn mark_responded(&self, user_id: Uuid) -> Result<(), PersistenceError> {
        if let Some(mut log) = self.log.get_mut(&user_id) {
            if let Some(record) = log.iter_mut().rev().find(|r| !r.response_received) {
                record.response_received = true;
                record.response_at = Some(Utc::now());
            }
        }
        Ok(())
    }
}
