//! Gamification reads
//!
//! The summary row is owned by the activity pipeline (a database trigger in
//! the managed deployment); the coach only reads it, plus the activity and
//! redemption facts the proactive rules need.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use coach_core::GamificationSummary;

use crate::{PersistenceError, ScyllaClient};

/// Gamification summary + activity facts
#[async_trait]
pub trait GamificationStore: Send + Sync {
    async fn summary(&self, user_id: Uuid) -> Result<Option<GamificationSummary>, PersistenceError>;

    /// Whether any completed activity exists for the given local date
    async fn has_activity_on(&self, user_id: Uuid, date: NaiveDate)
        -> Result<bool, PersistenceError>;

    /// Timestamp of the most recent completed activity
    async fn last_completion_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError>;

    /// Whether the user redeemed any reward since `since`
    async fn redeemed_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaGamificationStore {
    client: ScyllaClient,
}

impl ScyllaGamificationStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GamificationStore for ScyllaGamificationStore {
    async fn summary(&self, user_id: Uuid) -> Result<Option<GamificationSummary>, PersistenceError> {
        let query = format!(
            "SELECT total_points, level, current_streak, longest_streak, last_activity_date
             FROM {}.gamification WHERE user_id = ?",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (total_points, level, current_streak, longest_streak, last_activity_date): (
                    i64,
                    i64,
                    i64,
                    i64,
                    Option<String>,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                return Ok(Some(GamificationSummary {
                    user_id,
                    total_points,
                    level,
                    current_streak,
                    longest_streak,
                    last_activity_date: last_activity_date
                        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                }));
            }
        }
        Ok(None)
    }

    async fn has_activity_on(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, PersistenceError> {
        let query = format!(
            "SELECT activity_date, is_completed FROM {}.daily_activities
             WHERE user_id = ? LIMIT 20",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        let wanted = date.format("%Y-%m-%d").to_string();
        if let Some(rows) = result.rows {
            for row in rows {
                let (activity_date, is_completed): (String, bool) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                if is_completed && activity_date == wanted {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn last_completion_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        let query = format!(
            "SELECT completed_at, is_completed FROM {}.daily_activities
             WHERE user_id = ? LIMIT 20",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        if let Some(rows) = result.rows {
            for row in rows {
                let (completed_at, is_completed): (i64, bool) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                if is_completed {
                    return Ok(DateTime::from_timestamp_millis(completed_at));
                }
            }
        }
        Ok(None)
    }

    async fn redeemed_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let query = format!(
            "SELECT created_at FROM {}.reward_redemptions WHERE user_id = ? LIMIT 1",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (created_at,): (i64,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                return Ok(created_at >= since.timestamp_millis());
            }
        }
        Ok(false)
    }
}

/// In-memory gamification facts, settable from tests
#[derive(Default)]
pub struct InMemoryGamificationStore {
    summaries: DashMap<Uuid, GamificationSummary>,
    completions: DashMap<Uuid, Vec<DateTime<Utc>>>,
    redemptions: Mutex<Vec<(Uuid, DateTime<Utc>)>>,
}

impl InMemoryGamificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_summary(&self, summary: GamificationSummary) {
        self.summaries.insert(summary.user_id, summary);
    }

    pub fn add_completion(&self, user_id: Uuid, at: DateTime<Utc>) {
        self.completions.entry(user_id).or_default().push(at);
    }

    pub fn add_redemption(&self, user_id: Uuid, at: DateTime<Utc>) {
        self.redemptions.lock().push((user_id, at));
    }
}

#[async_trait]
impl GamificationStore for InMemoryGamificationStore {
    async fn summary(&self, user_id: Uuid) -> Result<Option<GamificationSummary>, PersistenceError> {
        Ok(self.summaries.get(&user_id).map(|s| s.clone()))
    }

    async fn has_activity_on(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, PersistenceError> {
        Ok(self
            .completions
            .get(&user_id)
            .map(|c| c.iter().any(|at| at.date_naive() == date))
            .unwrap_or(false))
    }

    async fn last_completion_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        Ok(self
            .completions
            .get(&user_id)
            .and_then(|c| c.iter().max().copied()))
    }

    async fn redeemed_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        Ok(self
            .redemptions
            .lock()
            .iter()
            .any(|(id, at)| *id == user_id && *at >= since))
    }
}
