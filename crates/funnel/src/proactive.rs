//! Proactive messaging engine
//!
//! Eight trigger rules evaluated in fixed priority order against stored
//! user/activity data. The first rule that fires wins; the winner is then
//! checked against the per-user-per-type cooldown. A cooldown rejection ends
//! the evaluation; lower-priority triggers are not probed in that case.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use coach_core::{GamificationSummary, Pillar, UserProfile};
use coach_persistence::{
    ConversationStore, FeedbackStore, GamificationStore, ProactiveRecord, ProactiveStore,
};

use crate::FunnelError;

/// The eight proactive triggers, in priority order (highest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProactiveTrigger {
    StreakAtRisk,
    MilestoneAchieved,
    XpThreshold,
    CheckinMissed,
    SuccessPattern,
    RepeatedDifficulties,
    ProgressStagnant,
    Inactive24h,
}

impl ProactiveTrigger {
    pub const PRIORITY: [ProactiveTrigger; 8] = [
        ProactiveTrigger::StreakAtRisk,
        ProactiveTrigger::MilestoneAchieved,
        ProactiveTrigger::XpThreshold,
        ProactiveTrigger::CheckinMissed,
        ProactiveTrigger::SuccessPattern,
        ProactiveTrigger::RepeatedDifficulties,
        ProactiveTrigger::ProgressStagnant,
        ProactiveTrigger::Inactive24h,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreakAtRisk => "streak_at_risk",
            Self::MilestoneAchieved => "milestone_achieved",
            Self::XpThreshold => "xp_threshold",
            Self::CheckinMissed => "checkin_missed",
            Self::SuccessPattern => "success_pattern",
            Self::RepeatedDifficulties => "repeated_difficulties",
            Self::ProgressStagnant => "progress_stagnant",
            Self::Inactive24h => "inactive_24h",
        }
    }
}

/// A trigger that fired, with its rendered message
#[derive(Debug, Clone)]
pub struct ProactiveMessage {
    pub trigger: ProactiveTrigger,
    pub message: String,
    pub metadata: Value,
}

/// Everything the rules look at, loaded once per check
struct Snapshot {
    gamification: Option<GamificationSummary>,
    activity_today: bool,
    last_user_message_at: Option<DateTime<Utc>>,
    last_completion_at: Option<DateTime<Utc>>,
    /// (pillar, difficulty mention count) over the last 7 days
    difficulty_counts: Vec<(Pillar, usize)>,
    redeemed_recently: bool,
}

const DIFFICULTY_KEYWORDS: &[&str] = &[
    "difícil",
    "dificil",
    "não consigo",
    "nao consigo",
    "complicado",
    "pesado",
    "cansativo",
    "muito",
];

/// Brasília wall clock (UTC-3)
fn sao_paulo_hour(now: DateTime<Utc>) -> u32 {
    let offset = FixedOffset::west_opt(3 * 3600).expect("valid offset");
    now.with_timezone(&offset).hour()
}

/// Rule evaluation over stored user data, gated by the cooldown store
pub struct ProactiveEngine {
    gamification: Arc<dyn GamificationStore>,
    conversations: Arc<dyn ConversationStore>,
    feedback: Arc<dyn FeedbackStore>,
    proactive: Arc<dyn ProactiveStore>,
    cooldown: Duration,
}

impl ProactiveEngine {
    pub fn new(
        gamification: Arc<dyn GamificationStore>,
        conversations: Arc<dyn ConversationStore>,
        feedback: Arc<dyn FeedbackStore>,
        proactive: Arc<dyn ProactiveStore>,
        cooldown_hours: i64,
    ) -> Self {
        Self {
            gamification,
            conversations,
            feedback,
            proactive,
            cooldown: Duration::hours(cooldown_hours),
        }
    }

    /// Check whether the user qualifies for a proactive message right now.
    ///
    /// At most one message is returned; it has already been recorded in the
    /// proactive log when this returns `Some`.
    pub async fn check_opportunity(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<Option<ProactiveMessage>, FunnelError> {
        let snapshot = self.load_snapshot(profile.id, now).await?;
        let first_name = profile.first_name();

        let Some(message) = self.first_firing_trigger(&snapshot, first_name, now) else {
            return Ok(None);
        };

        // The winner must pass cooldown; on rejection evaluation stops here
        // rather than falling through to lower-priority triggers.
        let can_send = self
            .proactive
            .can_send(profile.id, message.trigger.as_str(), self.cooldown)
            .await?;
        if !can_send {
            tracing::debug!(
                user_id = %profile.id,
                trigger = message.trigger.as_str(),
                "proactive trigger suppressed by cooldown"
            );
            return Ok(None);
        }

        self.proactive
            .record(&ProactiveRecord::new(
                profile.id,
                message.trigger.as_str(),
                message.message.clone(),
                message.metadata.clone(),
            ))
            .await?;

        Ok(Some(message))
    }

    async fn load_snapshot(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Snapshot, FunnelError> {
        let gamification = self.gamification.summary(user_id).await?;
        let sp_offset = FixedOffset::west_opt(3 * 3600).expect("valid offset");
        let today = now.with_timezone(&sp_offset).date_naive();
        let activity_today = self.gamification.has_activity_on(user_id, today).await?;
        let last_user_message_at = self.conversations.last_user_message_at(user_id).await?;
        let last_completion_at = self.gamification.last_completion_at(user_id).await?;
        let redeemed_recently = self
            .gamification
            .redeemed_since(user_id, now - Duration::days(7))
            .await?;

        let feedbacks = self.feedback.recent(user_id, now - Duration::days(7)).await?;
        let mut difficulty_counts: Vec<(Pillar, usize)> = Vec::new();
        if feedbacks.len() >= 3 {
            for record in &feedbacks {
                let lower = record.feedback_text.to_lowercase();
                if DIFFICULTY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                    match difficulty_counts.iter_mut().find(|(p, _)| *p == record.plan_type) {
                        Some((_, count)) => *count += 1,
                        None => difficulty_counts.push((record.plan_type, 1)),
                    }
                }
            }
        }

        Ok(Snapshot {
            gamification,
            activity_today,
            last_user_message_at,
            last_completion_at,
            difficulty_counts,
            redeemed_recently,
        })
    }

    fn first_firing_trigger(
        &self,
        snapshot: &Snapshot,
        first_name: &str,
        now: DateTime<Utc>,
    ) -> Option<ProactiveMessage> {
        for trigger in ProactiveTrigger::PRIORITY {
            let fired = match trigger {
                ProactiveTrigger::StreakAtRisk => streak_at_risk(snapshot, first_name),
                ProactiveTrigger::MilestoneAchieved => milestone_achieved(snapshot, first_name),
                ProactiveTrigger::XpThreshold => xp_threshold(snapshot, first_name),
                ProactiveTrigger::CheckinMissed => checkin_missed(snapshot, first_name, now),
                ProactiveTrigger::SuccessPattern => success_pattern(snapshot, first_name),
                ProactiveTrigger::RepeatedDifficulties => repeated_difficulties(snapshot, first_name),
                ProactiveTrigger::ProgressStagnant => progress_stagnant(snapshot, first_name, now),
                ProactiveTrigger::Inactive24h => inactive_24h(snapshot, first_name, now),
            };
            if fired.is_some() {
                return fired;
            }
        }
        None
    }
}

use coach_config::constants::proactive as limits;

/// Rule 1: streak of 7+ days with no activity yet today
fn streak_at_risk(snapshot: &Snapshot, first_name: &str) -> Option<ProactiveMessage> {
    let streak = snapshot.gamification.as_ref()?.current_streak;
    if streak >= limits::STREAK_AT_RISK_MIN && !snapshot.activity_today {
        return Some(ProactiveMessage {
            trigger: ProactiveTrigger::StreakAtRisk,
            message: format!(
                "🔥 {first_name}! Sua sequência de {streak} dias está em risco! 😱 Não deixe todo \
                 esse progresso escapar. Uma atividade simples já mantém sua chama acesa! 💪"
            ),
            metadata: json!({ "current_streak": streak }),
        });
    }
    None
}

/// Rule 2: just crossed a 1000-XP milestone (within 100 XP of it)
fn milestone_achieved(snapshot: &Snapshot, first_name: &str) -> Option<ProactiveMessage> {
    let xp = snapshot.gamification.as_ref()?.total_points;
    if xp >= limits::XP_MILESTONE_STEP && xp % limits::XP_MILESTONE_STEP < 100 {
        let milestone = (xp / limits::XP_MILESTONE_STEP) * limits::XP_MILESTONE_STEP;
        return Some(ProactiveMessage {
            trigger: ProactiveTrigger::MilestoneAchieved,
            message: format!(
                "🎉 INCRÍVEL, {first_name}! Você acabou de atingir {milestone} XP! 🏆 Sua \
                 dedicação está transformando sua vida. Continue assim, você é uma inspiração! 💫"
            ),
            metadata: json!({ "milestone": milestone, "total_xp": xp }),
        });
    }
    None
}

/// Rule 3: large XP balance with no recent redemption
fn xp_threshold(snapshot: &Snapshot, first_name: &str) -> Option<ProactiveMessage> {
    let xp = snapshot.gamification.as_ref()?.total_points;
    if xp >= limits::XP_REWARD_THRESHOLD && !snapshot.redeemed_recently {
        return Some(ProactiveMessage {
            trigger: ProactiveTrigger::XpThreshold,
            message: format!(
                "✨ {first_name}, você tem {xp} XP acumulados! 🎁 Que tal trocar por uma \
                 recompensa incrível? Consultas, e-books, descontos... Você merece! 🌟"
            ),
            metadata: json!({ "total_xp": xp }),
        });
    }
    None
}

/// Rule 4: no activity today and it's past 20h in São Paulo
fn checkin_missed(
    snapshot: &Snapshot,
    first_name: &str,
    now: DateTime<Utc>,
) -> Option<ProactiveMessage> {
    if sao_paulo_hour(now) < limits::CHECKIN_NUDGE_HOUR || snapshot.activity_today {
        return None;
    }
    Some(ProactiveMessage {
        trigger: ProactiveTrigger::CheckinMissed,
        message: format!(
            "{first_name}, ainda dá tempo! ⏰ Que tal registrar pelo menos uma atividade hoje? \
             Mesmo pequenos passos contam para manter seu ritmo! 🌟"
        ),
        metadata: json!({ "hour": sao_paulo_hour(now) }),
    })
}

/// Rule 5: streak landed exactly on a celebration milestone
fn success_pattern(snapshot: &Snapshot, first_name: &str) -> Option<ProactiveMessage> {
    let streak = snapshot.gamification.as_ref()?.current_streak;
    if [7, 14, 21, 30].contains(&streak) {
        return Some(ProactiveMessage {
            trigger: ProactiveTrigger::SuccessPattern,
            message: format!(
                "🌟 {first_name}, {streak} dias consecutivos! 🎊 Você está provando que \
                 transformação real acontece com consistência. Seu futuro eu está muito \
                 orgulhoso! 💚"
            ),
            metadata: json!({ "streak": streak }),
        });
    }
    None
}

/// Rule 6: the same pillar flagged as difficult 3+ times in a week
fn repeated_difficulties(snapshot: &Snapshot, first_name: &str) -> Option<ProactiveMessage> {
    let (pillar, count) = snapshot
        .difficulty_counts
        .iter()
        .max_by_key(|(_, count)| *count)
        .copied()?;
    if count >= 3 {
        return Some(ProactiveMessage {
            trigger: ProactiveTrigger::RepeatedDifficulties,
            message: format!(
                "{first_name}, notei que você está com dificuldades no pilar {}. 💙 Que tal \
                 ajustarmos seu plano para algo mais adequado? Vamos juntos encontrar o que \
                 funciona melhor para você! ✨",
                pillar.label_pt()
            ),
            metadata: json!({ "difficult_pillar": pillar.as_str(), "count": count }),
        });
    }
    None
}

/// Rule 7: no completed activity for 3+ days
fn progress_stagnant(
    snapshot: &Snapshot,
    first_name: &str,
    now: DateTime<Utc>,
) -> Option<ProactiveMessage> {
    let last = snapshot.last_completion_at?;
    let days = (now - last).num_days();
    if days >= 3 {
        return Some(ProactiveMessage {
            trigger: ProactiveTrigger::ProgressStagnant,
            message: format!(
                "{first_name}, percebi que faz alguns dias sem registrar atividades. 🤔 Quer que \
                 eu ajuste seu plano para algo mais compatível com sua rotina atual? Estou aqui \
                 para te apoiar! 🌟"
            ),
            metadata: json!({ "days_stagnant": days }),
        });
    }
    None
}

/// Rule 8: no inbound message for 24h+
fn inactive_24h(
    snapshot: &Snapshot,
    first_name: &str,
    now: DateTime<Utc>,
) -> Option<ProactiveMessage> {
    let last = snapshot.last_user_message_at?;
    let hours = (now - last).num_hours();
    if hours >= 24 {
        return Some(ProactiveMessage {
            trigger: ProactiveTrigger::Inactive24h,
            message: format!(
                "Oi {first_name}! 👋 Notei que você está um pouco afastado(a). Como estão as \
                 coisas? Lembre-se: pequenos passos todo dia fazem toda a diferença! 💪"
            ),
            metadata: json!({ "hours_inactive": hours }),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::{FunnelStage, TurnRole};
    use coach_persistence::{
        FeedbackRecord, InMemoryConversationStore, InMemoryFeedbackStore,
        InMemoryGamificationStore, InMemoryProactiveStore, InteractionRecord,
    };

    fn engine(
        gamification: Arc<InMemoryGamificationStore>,
        conversations: Arc<InMemoryConversationStore>,
        feedback: Arc<InMemoryFeedbackStore>,
        proactive: Arc<InMemoryProactiveStore>,
    ) -> ProactiveEngine {
        ProactiveEngine::new(gamification, conversations, feedback, proactive, 24)
    }

    fn profile() -> UserProfile {
        let mut p = UserProfile::new(Uuid::new_v4());
        p.full_name = Some("Maria Silva".to_string());
        p
    }

    fn summary(user_id: Uuid, points: i64, streak: i64) -> GamificationSummary {
        GamificationSummary {
            user_id,
            total_points: points,
            level: coach_core::level_for_points(points),
            current_streak: streak,
            longest_streak: streak,
            last_activity_date: None,
        }
    }

    /// Noon in São Paulo, away from the check-in nudge window
    fn midday() -> DateTime<Utc> {
        Utc::now()
            .with_hour(15)
            .and_then(|t| t.with_minute(0))
            .unwrap()
    }

    #[tokio::test]
    async fn streak_at_risk_wins_over_lower_triggers() {
        let gamification = Arc::new(InMemoryGamificationStore::new());
        let conversations = Arc::new(InMemoryConversationStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let proactive = Arc::new(InMemoryProactiveStore::new());
        let user = profile();

        // Streak of 9, no activity today, AND inactive >24h: priority picks
        // streak_at_risk
        gamification.set_summary(summary(user.id, 300, 9));
        conversations
            .append(&InteractionRecord::new(
                user.id,
                TurnRole::User,
                "oi",
                FunnelStage::Partner,
            ))
            .await
            .unwrap();

        let engine = engine(gamification, conversations, feedback, proactive.clone());
        let message = engine
            .check_opportunity(&user, midday())
            .await
            .unwrap()
            .expect("trigger should fire");

        assert_eq!(message.trigger, ProactiveTrigger::StreakAtRisk);
        assert!(message.message.contains("Maria"));
        assert!(message.message.contains("9 dias"));
        // Already recorded
        assert_eq!(proactive.sent(user.id).len(), 1);
    }

    #[tokio::test]
    async fn cooldown_rejection_stops_evaluation_entirely() {
        let gamification = Arc::new(InMemoryGamificationStore::new());
        let conversations = Arc::new(InMemoryConversationStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let proactive = Arc::new(InMemoryProactiveStore::new());
        let user = profile();

        // Both streak_at_risk and xp_threshold would fire
        gamification.set_summary(summary(user.id, 6500, 10));
        // But streak_at_risk is on cooldown
        proactive
            .record(&ProactiveRecord::new(
                user.id,
                "streak_at_risk",
                "🔥",
                Value::Null,
            ))
            .await
            .unwrap();

        let engine = engine(gamification, conversations, feedback, proactive.clone());
        let message = engine.check_opportunity(&user, midday()).await.unwrap();

        // No fallthrough to xp_threshold: evaluation stops on cooldown
        assert!(message.is_none());
        assert_eq!(proactive.sent(user.id).len(), 1);
    }

    #[tokio::test]
    async fn milestone_fires_when_just_crossed() {
        let gamification = Arc::new(InMemoryGamificationStore::new());
        let conversations = Arc::new(InMemoryConversationStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let proactive = Arc::new(InMemoryProactiveStore::new());
        let user = profile();

        gamification.set_summary(summary(user.id, 2030, 2));
        gamification.add_completion(user.id, midday());

        let engine = engine(gamification, conversations, feedback, proactive);
        let message = engine
            .check_opportunity(&user, midday())
            .await
            .unwrap()
            .expect("milestone should fire");

        assert_eq!(message.trigger, ProactiveTrigger::MilestoneAchieved);
        assert_eq!(message.metadata["milestone"], 2000);
    }

    #[tokio::test]
    async fn far_past_milestone_does_not_fire() {
        let gamification = Arc::new(InMemoryGamificationStore::new());
        let conversations = Arc::new(InMemoryConversationStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let proactive = Arc::new(InMemoryProactiveStore::new());
        let user = profile();

        // 2500 XP: 500 past the milestone, recent completion, active today
        gamification.set_summary(summary(user.id, 2500, 2));
        gamification.add_completion(user.id, midday());
        conversations
            .append(&InteractionRecord::new(
                user.id,
                TurnRole::User,
                "oi",
                FunnelStage::Partner,
            ))
            .await
            .unwrap();

        let engine = engine(gamification, conversations, feedback, proactive);
        assert!(engine.check_opportunity(&user, midday()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_difficulties_picks_the_worst_pillar() {
        let gamification = Arc::new(InMemoryGamificationStore::new());
        let conversations = Arc::new(InMemoryConversationStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let proactive = Arc::new(InMemoryProactiveStore::new());
        let user = profile();

        gamification.set_summary(summary(user.id, 100, 1));
        gamification.add_completion(user.id, midday());
        conversations
            .append(&InteractionRecord::new(
                user.id,
                TurnRole::User,
                "oi",
                FunnelStage::Partner,
            ))
            .await
            .unwrap();

        let now = Utc::now();
        for text in ["muito difícil", "não consigo", "pesado demais"] {
            feedback.insert_raw(FeedbackRecord {
                user_id: user.id,
                plan_type: Pillar::Physical,
                feedback_text: text.to_string(),
                status: "pending".to_string(),
                plan_updated: false,
                ai_response: None,
                created_at: now,
                processed_at: None,
            });
        }

        let engine = engine(gamification, conversations, feedback, proactive);
        let message = engine
            .check_opportunity(&user, midday())
            .await
            .unwrap()
            .expect("difficulties should fire");

        assert_eq!(message.trigger, ProactiveTrigger::RepeatedDifficulties);
        assert!(message.message.contains("físico"));
        assert_eq!(message.metadata["count"], 3);
    }

    #[tokio::test]
    async fn inactive_24h_is_the_lowest_priority() {
        let gamification = Arc::new(InMemoryGamificationStore::new());
        let conversations = Arc::new(InMemoryConversationStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let proactive = Arc::new(InMemoryProactiveStore::new());
        let user = profile();

        gamification.set_summary(summary(user.id, 100, 1));
        gamification.add_completion(user.id, midday());
        conversations
            .append(&InteractionRecord {
                user_id: user.id,
                role: TurnRole::User,
                content: "oi".to_string(),
                stage: FunnelStage::Partner,
                created_at: Utc::now() - Duration::days(2),
            })
            .await
            .unwrap();

        let engine = engine(gamification, conversations, feedback, proactive);
        let message = engine
            .check_opportunity(&user, midday())
            .await
            .unwrap()
            .expect("inactivity should fire");

        assert_eq!(message.trigger, ProactiveTrigger::Inactive24h);
        assert!(message.metadata["hours_inactive"].as_i64().unwrap() >= 24);
    }

    #[tokio::test]
    async fn quiet_user_triggers_nothing() {
        let gamification = Arc::new(InMemoryGamificationStore::new());
        let conversations = Arc::new(InMemoryConversationStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let proactive = Arc::new(InMemoryProactiveStore::new());
        let user = profile();

        gamification.set_summary(summary(user.id, 100, 1));
        gamification.add_completion(user.id, midday());
        conversations
            .append(&InteractionRecord::new(
                user.id,
                TurnRole::User,
                "oi",
                FunnelStage::Partner,
            ))
            .await
            .unwrap();

        let engine = engine(gamification, conversations, feedback, proactive);
        assert!(engine.check_opportunity(&user, midday()).await.unwrap().is_none());
    }
}
