//! User profile store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use coach_core::{BillingStatus, UserProfile};

use crate::{PersistenceError, ScyllaClient};

/// Profile lookup and upsert
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>, PersistenceError>;

    /// Probe every candidate spelling (digits, `+digits`) and return the
    /// first profile found. Stored phones are inconsistent about `+`.
    async fn find_by_phone(&self, candidates: &[String])
        -> Result<Option<UserProfile>, PersistenceError>;

    async fn upsert(&self, profile: &UserProfile) -> Result<(), PersistenceError>;
}

/// ScyllaDB-backed profile store
#[derive(Clone)]
pub struct ScyllaProfileStore {
    client: ScyllaClient,
}

impl ScyllaProfileStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn user_id_for_phone(&self, phone: &str) -> Result<Option<Uuid>, PersistenceError> {
        let query = format!(
            "SELECT user_id FROM {}.profiles_by_phone WHERE phone = ?",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (phone,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (user_id,): (Uuid,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                return Ok(Some(user_id));
            }
        }
        Ok(None)
    }
}

type ProfileRow = (
    Uuid,
    Option<String>,
    Option<String>,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<f32>,
    Option<f32>,
    Option<f32>,
    Option<String>,
    Option<String>,
    Option<bool>,
    Option<String>,
    Option<String>,
    i64,
);

fn row_to_profile(row: scylla::frame::response::result::Row) -> Result<UserProfile, PersistenceError> {
    let (
        user_id,
        phone,
        full_name,
        age,
        goal_type,
        activity_level,
        current_weight_kg,
        target_weight_kg,
        height_cm,
        gender,
        billing_status,
        notifications_enabled,
        cultural_context,
        spiritual_belief,
        created_at,
    ): ProfileRow = row
        .into_typed()
        .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

    Ok(UserProfile {
        id: user_id,
        phone,
        full_name,
        age: age.and_then(|a| u8::try_from(a).ok()),
        goal_type,
        activity_level,
        current_weight_kg,
        target_weight_kg,
        height_cm,
        gender,
        billing_status: billing_status
            .as_deref()
            .map(BillingStatus::parse)
            .unwrap_or_default(),
        notifications_enabled: notifications_enabled.unwrap_or(true),
        cultural_context,
        spiritual_belief,
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
    })
}

const PROFILE_COLUMNS: &str = "user_id, phone, full_name, age, goal_type, activity_level, \
     current_weight_kg, target_weight_kg, height_cm, gender, billing_status, \
     notifications_enabled, cultural_context, spiritual_belief, created_at";

#[async_trait]
impl ProfileStore for ScyllaProfileStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.user_profiles WHERE user_id = ?",
            PROFILE_COLUMNS,
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(row_to_profile(row)?));
            }
        }
        Ok(None)
    }

    async fn find_by_phone(
        &self,
        candidates: &[String],
    ) -> Result<Option<UserProfile>, PersistenceError> {
        for phone in candidates {
            if let Some(user_id) = self.user_id_for_phone(phone).await? {
                return self.get(user_id).await;
            }
        }
        Ok(None)
    }

    async fn upsert(&self, profile: &UserProfile) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.user_profiles ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace(),
            PROFILE_COLUMNS
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    profile.id,
                    &profile.phone,
                    &profile.full_name,
                    profile.age.map(i32::from),
                    &profile.goal_type,
                    &profile.activity_level,
                    profile.current_weight_kg,
                    profile.target_weight_kg,
                    profile.height_cm,
                    &profile.gender,
                    profile.billing_status.as_str(),
                    profile.notifications_enabled,
                    &profile.cultural_context,
                    &profile.spiritual_belief,
                    profile.created_at.timestamp_millis(),
                ),
            )
            .await?;

        if let Some(phone) = &profile.phone {
            let index_query = format!(
                "INSERT INTO {}.profiles_by_phone (phone, user_id) VALUES (?, ?)",
                self.client.keyspace()
            );
            self.client
                .session()
                .query_unpaged(index_query, (phone, profile.id))
                .await?;
        }

        tracing::debug!(user_id = %profile.id, "profile upserted");
        Ok(())
    }
}

/// In-memory profile store for tests and persistence-free development
#[derive(Default)]
pub struct InMemoryProfileStore {
    by_id: DashMap<Uuid, UserProfile>,
    by_phone: DashMap<String, Uuid>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>, PersistenceError> {
        Ok(self.by_id.get(&user_id).map(|p| p.clone()))
    }

    async fn find_by_phone(
        &self,
        candidates: &[String],
    ) -> Result<Option<UserProfile>, PersistenceError> {
        for phone in candidates {
            if let Some(user_id) = self.by_phone.get(phone).map(|id| *id) {
                return self.get(user_id).await;
            }
        }
        Ok(None)
    }

    async fn upsert(&self, profile: &UserProfile) -> Result<(), PersistenceError> {
        if let Some(phone) = &profile.phone {
            self.by_phone.insert(phone.clone(), profile.id);
        }
        self.by_id.insert(profile.id, profile.clone());
        Ok(())
    }
}
