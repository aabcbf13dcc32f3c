//! Append-only conversation log
//!
//! Every inbound message and every assistant reply lands here. The recent
//! window is what the prompt builder and the progression tracker see; the
//! log itself is never mutated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use coach_core::{FunnelStage, Turn, TurnRole};

use crate::{PersistenceError, ScyllaClient};

/// One interaction row
#[derive(Debug, Clone)]
pub struct InteractionRecord {
    pub user_id: Uuid,
    pub role: TurnRole,
    pub content: String,
    pub stage: FunnelStage,
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(user_id: Uuid, role: TurnRole, content: impl Into<String>, stage: FunnelStage) -> Self {
        Self {
            user_id,
            role,
            content: content.into(),
            stage,
            created_at: Utc::now(),
        }
    }

    pub fn to_turn(&self) -> Turn {
        Turn {
            role: self.role,
            content: self.content.clone(),
            timestamp: self.created_at,
        }
    }
}

/// Conversation log access
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(&self, record: &InteractionRecord) -> Result<(), PersistenceError>;

    /// Most recent `limit` turns in chronological order
    async fn recent(&self, user_id: Uuid, limit: usize) -> Result<Vec<Turn>, PersistenceError>;

    /// Timestamp of the user's last inbound message, for inactivity rules
    async fn last_user_message_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaConversationStore {
    client: ScyllaClient,
}

impl ScyllaConversationStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConversationStore for ScyllaConversationStore {
    async fn append(&self, record: &InteractionRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.conversation_memory
             (user_id, created_at, entry_id, role, content, stage)
             VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    record.user_id,
                    record.created_at.timestamp_millis(),
                    Uuid::new_v4(),
                    record.role.as_str(),
                    &record.content,
                    record.stage.as_str(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn recent(&self, user_id: Uuid, limit: usize) -> Result<Vec<Turn>, PersistenceError> {
        let query = format!(
            "SELECT role, content, created_at FROM {}.conversation_memory
             WHERE user_id = ? LIMIT ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, limit as i32))
            .await?;

        let mut turns = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (role, content, created_at): (String, String, i64) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                turns.push(Turn {
                    role: TurnRole::parse(&role),
                    content,
                    timestamp: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
                });
            }
        }

        // Rows come newest-first; callers want chronological order
        turns.reverse();
        Ok(turns)
    }

    async fn last_user_message_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        // The partition is small and newest-first; scan until a user row
        let query = format!(
            "SELECT role, created_at FROM {}.conversation_memory WHERE user_id = ? LIMIT 50",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        if let Some(rows) = result.rows {
            for row in rows {
                let (role, created_at): (String, i64) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                if role == "user" {
                    return Ok(DateTime::from_timestamp_millis(created_at));
                }
            }
        }
        Ok(None)
    }
}

/// In-memory conversation log
#[derive(Default)]
pub struct InMemoryConversationStore {
    log: DashMap<Uuid, Vec<InteractionRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, user_id: Uuid) -> usize {
        self.log.get(&user_id).map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, user_id: Uuid) -> bool {
        self.len(user_id) == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, record: &InteractionRecord) -> Result<(), PersistenceError> {
        self.log.entry(record.user_id).or_default().push(record.clone());
        Ok(())
    }

    async fn recent(&self, user_id: Uuid, limit: usize) -> Result<Vec<Turn>, PersistenceError> {
        Ok(self
            .log
            .get(&user_id)
            .map(|l| {
                let start = l.len().saturating_sub(limit);
                l[start..].iter().map(|r| r.to_turn()).collect()
            })
            .unwrap_or_default())
    }

    async fn last_user_message_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        Ok(self.log.get(&user_id).and_then(|l| {
            l.iter()
                .rev()
                .find(|r| r.role == TurnRole::User)
                .map(|r| r.created_at)
        }))
    }
}
