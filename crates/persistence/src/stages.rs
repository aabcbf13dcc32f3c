//! Funnel stage log
//!
//! The stage table is an append-only log; the latest row per user is the
//! current stage. A missing row means the user is a fresh SDR-stage entrant,
//! which callers handle rather than erroring.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use coach_core::{FunnelStage, TransitionReason};

use crate::{PersistenceError, ScyllaClient};

/// One row of the stage log
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub user_id: Uuid,
    pub stage: FunnelStage,
    pub bant_score: i32,
    pub metadata: Value,
    pub reason: TransitionReason,
    pub created_at: DateTime<Utc>,
}

impl StageRecord {
    /// The state a brand-new user starts in
    pub fn initial(user_id: Uuid) -> Self {
        Self {
            user_id,
            stage: FunnelStage::Sdr,
            bant_score: 0,
            metadata: Value::Object(Default::default()),
            reason: TransitionReason::Manual,
            created_at: Utc::now(),
        }
    }
}

/// Stage log access
#[async_trait]
pub trait StageStore: Send + Sync {
    /// Latest stage row for the user, `None` for first contact
    async fn current(&self, user_id: Uuid) -> Result<Option<StageRecord>, PersistenceError>;

    /// Append a new stage row (also used for metadata/BANT updates within
    /// the same stage)
    async fn record(&self, record: &StageRecord) -> Result<(), PersistenceError>;

    /// Operational reset back to SDR; the only backward path in the funnel
    async fn reset(&self, user_id: Uuid) -> Result<(), PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaStageStore {
    client: ScyllaClient,
}

impl ScyllaStageStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StageStore for ScyllaStageStore {
    async fn current(&self, user_id: Uuid) -> Result<Option<StageRecord>, PersistenceError> {
        let query = format!(
            "SELECT stage, bant_score, stage_metadata, transition_reason, created_at
             FROM {}.client_stages WHERE user_id = ? LIMIT 1",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (stage, bant_score, metadata, reason, created_at): (
                    String,
                    i32,
                    Option<String>,
                    Option<String>,
                    i64,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                let stage = FunnelStage::parse(&stage).ok_or_else(|| {
                    PersistenceError::InvalidData(format!("unknown stage '{}'", stage))
                })?;

                return Ok(Some(StageRecord {
                    user_id,
                    stage,
                    bant_score,
                    metadata: metadata
                        .and_then(|m| serde_json::from_str(&m).ok())
                        .unwrap_or(Value::Object(Default::default())),
                    reason: parse_reason(reason.as_deref()),
                    created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
                }));
            }
        }
        Ok(None)
    }

    async fn record(&self, record: &StageRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.client_stages
             (user_id, created_at, stage_id, stage, bant_score, stage_metadata, transition_reason)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
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
                    record.stage.as_str(),
                    record.bant_score,
                    record.metadata.to_string(),
                    record.reason.as_str(),
                ),
            )
            .await?;

        tracing::info!(
            user_id = %record.user_id,
            stage = %record.stage.as_str(),
            bant_score = record.bant_score,
            reason = %record.reason.as_str(),
            "stage recorded"
        );
        Ok(())
    }

    async fn reset(&self, user_id: Uuid) -> Result<(), PersistenceError> {
        self.record(&StageRecord::initial(user_id)).await
    }
}

/// In-memory stage log
#[derive(Default)]
pub struct InMemoryStageStore {
    log: DashMap<Uuid, Vec<StageRecord>>,
}

impl InMemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full log for assertions in tests
    pub fn history(&self, user_id: Uuid) -> Vec<StageRecord> {
        self.log.get(&user_id).map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StageStore for InMemoryStageStore {
    async fn current(&self, user_id: Uuid) -> Result<Option<StageRecord>, PersistenceError> {
        Ok(self.log.get(&user_id).and_then(|l| l.last().cloned()))
    }

    async fn record(&self, record: &StageRecord) -> Result<(), PersistenceError> {
        self.log.entry(record.user_id).or_default().push(record.clone());
        Ok(())
    }

    async fn reset(&self, user_id: Uuid) -> Result<(), PersistenceError> {
        self.record(&StageRecord::initial(user_id)).await
    }
}

fn parse_reason(s: Option<&str>) -> TransitionReason {
    match s {
        Some("reply_indicator") => TransitionReason::ReplyIndicator,
        Some("forced_progression") => TransitionReason::ForcedProgression,
        Some("guard_escalation") => TransitionReason::GuardEscalation,
        Some("detected") => TransitionReason::Detected,
        _ => TransitionReason::Manual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_row_wins() {
        let store = InMemoryStageStore::new();
        let user_id = Uuid::new_v4();
        assert!(store.current(user_id).await.unwrap().is_none());

        store.record(&StageRecord::initial(user_id)).await.unwrap();
        let mut next = StageRecord::initial(user_id);
        next.stage = FunnelStage::Specialist;
        next.reason = TransitionReason::ForcedProgression;
        store.record(&next).await.unwrap();

        let current = store.current(user_id).await.unwrap().unwrap();
        assert_eq!(current.stage, FunnelStage::Specialist);
        assert_eq!(store.history(user_id).len(), 2);
    }

    #[tokio::test]
    async fn reset_returns_to_sdr() {
        let store = InMemoryStageStore::new();
        let user_id = Uuid::new_v4();
        let mut record = StageRecord::initial(user_id);
        record.stage = FunnelStage::Partner;
        store.record(&record).await.unwrap();

        store.reset(user_id).await.unwrap();
        let current = store.current(user_id).await.unwrap().unwrap();
        assert_eq!(current.stage, FunnelStage::Sdr);
    }
}
