//! Guard decision audit trail

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// One recorded guard decision
#[derive(Debug, Clone)]
pub struct GuardMetricRecord {
    pub user_id: Uuid,
    pub stage_before: String,
    pub stage_after: String,
    pub issues: Vec<String>,
    pub hints: Vec<String>,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// Conversation metrics sink; write failures are logged, never propagated
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn record_guard_metric(&self, record: &GuardMetricRecord) -> Result<(), PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaMetricsStore {
    client: ScyllaClient,
}

impl ScyllaMetricsStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetricsStore for ScyllaMetricsStore {
    async fn record_guard_metric(&self, record: &GuardMetricRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.conversation_metrics
             (user_id, created_at, metric_id, stage_before, stage_after, issues, hints, guard_action)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
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
                    &record.stage_before,
                    &record.stage_after,
                    record.issues.join(","),
                    record.hints.join("|"),
                    &record.action,
                ),
            )
            .await?;
        Ok(())
    }
}

/// In-memory metrics sink
#[derive(Default)]
pub struct InMemoryMetricsStore {
    records: DashMap<Uuid, Vec<GuardMetricRecord>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(&self, user_id: Uuid) -> Vec<GuardMetricRecord> {
        self.records.get(&user_id).map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn record_guard_metric(&self, record: &GuardMetricRecord) -> Result<(), PersistenceError> {
        self.records.entry(record.user_id).or_default().push(record.clone());
        Ok(())
    }
}
