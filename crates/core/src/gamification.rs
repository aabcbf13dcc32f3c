//! Gamification summary types
//!
//! The summary row is mutated by a database trigger on activity inserts, not
//! by application code. The level rule is reproduced here as a pure function
//! so prompts and proactive rules can derive it without a round trip.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Level derived from accumulated points: 100 points per level, starting at 1
pub fn level_for_points(total_points: i64) -> i64 {
    total_points / 100 + 1
}

/// Per-user XP and streak summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationSummary {
    pub user_id: Uuid,
    pub total_points: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
}

impl GamificationSummary {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            total_points: 0,
            level: 1,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_rule() {
        assert_eq!(level_for_points(0), 1);
        assert_eq!(level_for_points(99), 1);
        assert_eq!(level_for_points(100), 2);
        assert_eq!(level_for_points(1250), 13);
    }
}
