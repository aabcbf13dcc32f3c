//! User profile types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing status of an end user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    #[default]
    Free,
    Trial,
    Active,
    PastDue,
    Cancelled,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Trial => "trial",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "trial" => Self::Trial,
            "active" => Self::Active,
            "past_due" => Self::PastDue,
            "cancelled" => Self::Cancelled,
            _ => Self::Free,
        }
    }
}

/// One end user of the coaching service
///
/// Created at signup, updated by the user or an operator, never hard-deleted
/// in normal flow. `cultural_context` and `spiritual_belief` personalize the
/// assistant's prompts when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub age: Option<u8>,
    pub goal_type: Option<String>,
    pub activity_level: Option<String>,
    pub current_weight_kg: Option<f32>,
    pub target_weight_kg: Option<f32>,
    pub height_cm: Option<f32>,
    pub gender: Option<String>,
    pub billing_status: BillingStatus,
    pub notifications_enabled: bool,
    pub cultural_context: Option<String>,
    pub spiritual_belief: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            phone: None,
            full_name: None,
            age: None,
            goal_type: None,
            activity_level: None,
            current_weight_kg: None,
            target_weight_kg: None,
            height_cm: None,
            gender: None,
            billing_status: BillingStatus::Free,
            notifications_enabled: true,
            cultural_context: None,
            spiritual_belief: None,
            created_at: Utc::now(),
        }
    }

    /// First name for message templates, with the generic fallback the
    /// assistant uses for unnamed users.
    pub fn first_name(&self) -> &str {
        self.full_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or("amigo(a)")
    }

    /// Days since signup, used for client-moment classification
    pub fn days_since_signup(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }

    /// A detailed profile (age + both weights) reads as analytical; anything
    /// less as expressive. Mirrors the prompt-personalization heuristic.
    pub fn is_detailed(&self) -> bool {
        self.age.is_some() && self.current_weight_kg.is_some() && self.target_weight_kg.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_name_falls_back() {
        let mut profile = UserProfile::new(Uuid::new_v4());
        assert_eq!(profile.first_name(), "amigo(a)");
        profile.full_name = Some("Maria da Silva".to_string());
        assert_eq!(profile.first_name(), "Maria");
    }

    #[test]
    fn detailed_profile_requires_all_fields() {
        let mut profile = UserProfile::new(Uuid::new_v4());
        assert!(!profile.is_detailed());
        profile.age = Some(34);
        profile.current_weight_kg = Some(82.0);
        profile.target_weight_kg = Some(74.0);
        assert!(profile.is_detailed());
    }
}
