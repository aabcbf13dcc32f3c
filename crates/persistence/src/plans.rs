//! Plan rows and plan feedback
//!
//! Plan lifecycle: a new plan is inserted by the generate-plan service; the
//! regeneration orchestrator deactivates the old row first. Rows are never
//! updated in place apart from the `is_active` flag flip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use coach_core::Pillar;

use crate::{PersistenceError, ScyllaClient};

/// One plan row
#[derive(Debug, Clone)]
pub struct PlanRecord {
    pub plan_id: Uuid,
    pub user_id: Uuid,
    pub plan_type: Pillar,
    pub content: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Plan row access
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Pillars that currently have an active plan
    async fn active_plan_types(&self, user_id: Uuid) -> Result<Vec<Pillar>, PersistenceError>;

    /// Flip `is_active` off for every active plan of the given type
    async fn deactivate(&self, user_id: Uuid, plan_type: Pillar) -> Result<(), PersistenceError>;

    async fn insert(&self, record: &PlanRecord) -> Result<(), PersistenceError>;
}

/// A feedback row tied to a plan type
#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    pub user_id: Uuid,
    pub plan_type: Pillar,
    pub feedback_text: String,
    pub status: String,
    pub plan_updated: bool,
    pub ai_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Plan feedback access
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Record feedback already consumed by a regeneration
    /// (`status = processed`, `plan_updated = true`)
    async fn record_processed(
        &self,
        user_id: Uuid,
        plan_type: Pillar,
        feedback_text: &str,
    ) -> Result<(), PersistenceError>;

    /// Feedback newer than `since`, newest first
    async fn recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedbackRecord>, PersistenceError>;
}

/// Fixed summary stored with automatic regenerations
pub const AUTO_REGEN_RESPONSE: &str = "Regenerado automaticamente pela IA Coach";

#[derive(Clone)]
pub struct ScyllaPlanStore {
    client: ScyllaClient,
}

impl ScyllaPlanStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn rows(&self, user_id: Uuid) -> Result<Vec<PlanRecord>, PersistenceError> {
        let query = format!(
            "SELECT plan_id, created_at, plan_type, content, is_active
             FROM {}.plans WHERE user_id = ?",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        let mut records = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (plan_id, created_at, plan_type, content, is_active): (
                    Uuid,
                    i64,
                    String,
                    Option<String>,
                    bool,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                let Some(plan_type) = Pillar::from_plan_type(&plan_type) else {
                    tracing::warn!(user_id = %user_id, plan_type = %plan_type, "unknown plan type, skipping row");
                    continue;
                };

                records.push(PlanRecord {
                    plan_id,
                    user_id,
                    plan_type,
                    content,
                    is_active,
                    created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
                });
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl PlanStore for ScyllaPlanStore {
    async fn active_plan_types(&self, user_id: Uuid) -> Result<Vec<Pillar>, PersistenceError> {
        let mut types: Vec<Pillar> = self
            .rows(user_id)
            .await?
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| r.plan_type)
            .collect();
        types.dedup();
        Ok(types)
    }

    async fn deactivate(&self, user_id: Uuid, plan_type: Pillar) -> Result<(), PersistenceError> {
        // is_active lives on clustered rows, so the flip is per matching row
        for record in self.rows(user_id).await? {
            if record.plan_type == plan_type && record.is_active {
                let query = format!(
                    "UPDATE {}.plans SET is_active = false
                     WHERE user_id = ? AND created_at = ? AND plan_id = ?",
                    self.client.keyspace()
                );
                self.client
                    .session()
                    .query_unpaged(
                        query,
                        (user_id, record.created_at.timestamp_millis(), record.plan_id),
                    )
                    .await?;
            }
        }

        tracing::info!(user_id = %user_id, plan_type = %plan_type, "plan deactivated");
        Ok(())
    }

    async fn insert(&self, record: &PlanRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.plans (user_id, created_at, plan_id, plan_type, content, is_active)
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
                    record.plan_id,
                    record.plan_type.as_str(),
                    &record.content,
                    record.is_active,
                ),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ScyllaFeedbackStore {
    client: ScyllaClient,
}

impl ScyllaFeedbackStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedbackStore for ScyllaFeedbackStore {
    async fn record_processed(
        &self,
        user_id: Uuid,
        plan_type: Pillar,
        feedback_text: &str,
    ) -> Result<(), PersistenceError> {
        let now = Utc::now().timestamp_millis();
        let query = format!(
            "INSERT INTO {}.plan_feedback
             (user_id, created_at, feedback_id, plan_type, feedback_text, status,
              plan_updated, ai_response, processed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    user_id,
                    now,
                    Uuid::new_v4(),
                    plan_type.as_str(),
                    feedback_text,
                    "processed",
                    true,
                    AUTO_REGEN_RESPONSE,
                    now,
                ),
            )
            .await?;
        Ok(())
    }

    async fn recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedbackRecord>, PersistenceError> {
        let query = format!(
            "SELECT created_at, plan_type, feedback_text, status, plan_updated, ai_response, processed_at
             FROM {}.plan_feedback WHERE user_id = ? AND created_at >= ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, since.timestamp_millis()))
            .await?;

        let mut records = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (created_at, plan_type, feedback_text, status, plan_updated, ai_response, processed_at): (
                    i64,
                    String,
                    String,
                    String,
                    bool,
                    Option<String>,
                    Option<i64>,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                let Some(plan_type) = Pillar::from_plan_type(&plan_type) else {
                    continue;
                };

                records.push(FeedbackRecord {
                    user_id,
                    plan_type,
                    feedback_text,
                    status,
                    plan_updated,
                    ai_response,
                    created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
                    processed_at: processed_at.and_then(DateTime::from_timestamp_millis),
                });
            }
        }
        Ok(records)
    }
}

/// In-memory plan store
#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: DashMap<Uuid, Vec<PlanRecord>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self, user_id: Uuid) -> Vec<PlanRecord> {
        self.plans.get(&user_id).map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn active_plan_types(&self, user_id: Uuid) -> Result<Vec<Pillar>, PersistenceError> {
        let mut types: Vec<Pillar> = self
            .all(user_id)
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| r.plan_type)
            .collect();
        types.dedup();
        Ok(types)
    }

    async fn deactivate(&self, user_id: Uuid, plan_type: Pillar) -> Result<(), PersistenceError> {
        if let Some(mut plans) = self.plans.get_mut(&user_id) {
            for record in plans.iter_mut() {
                if record.plan_type == plan_type {
                    record.is_active = false;
                }
            }
        }
        Ok(())
    }

    async fn insert(&self, record: &PlanRecord) -> Result<(), PersistenceError> {
        self.plans.entry(record.user_id).or_default().push(record.clone());
        Ok(())
    }
}

/// In-memory feedback store
#[derive(Default)]
pub struct InMemoryFeedbackStore {
    feedback: DashMap<Uuid, Vec<FeedbackRecord>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, record: FeedbackRecord) {
        self.feedback.entry(record.user_id).or_default().push(record);
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn record_processed(
        &self,
        user_id: Uuid,
        plan_type: Pillar,
        feedback_text: &str,
    ) -> Result<(), PersistenceError> {
        let now = Utc::now();
        self.insert_raw(FeedbackRecord {
            user_id,
            plan_type,
            feedback_text: feedback_text.to_string(),
            status: "processed".to_string(),
            plan_updated: true,
            ai_response: Some(AUTO_REGEN_RESPONSE.to_string()),
            created_at: now,
            processed_at: Some(now),
        });
        Ok(())
    }

    async fn recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedbackRecord>, PersistenceError> {
        Ok(self
            .feedback
            .get(&user_id)
            .map(|f| {
                f.iter()
                    .filter(|r| r.created_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
