//! Anti-loop progression evaluator
//!
//! The funnel is LLM-driven, but the model cannot be trusted to pace itself:
//! left alone it will happily re-ask the same anamnesis question forever.
//! This module is the deterministic safety valve layered on top. Four cheap,
//! explainable signals are checked and any one of them forces advancement to
//! the next sub-stage. False positives (advancing early) are preferred over
//! an infinite loop.
//!
//! The tracker is a value reconstructed per request from the stored
//! interaction log; it is never persisted and never shared between requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use coach_core::{FunnelStage, Pillar, Turn, TurnRole};

/// Case-insensitive frustration markers in the user's own words
static FRUSTRATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(cansado|frustrado|não aguento|repete|de novo|já falei)")
        .expect("frustration regex is valid")
});

/// Per-conversation bookkeeping used only to decide forced advancement
#[derive(Debug, Clone)]
pub struct ProgressionTracker {
    pub stage: FunnelStage,
    pub substage: u8,
    /// Normalized assistant questions, oldest first
    pub questions_asked: Vec<String>,
    /// Pillars touched so far; always a subset of `Pillar::ALL`
    pub topics_covered: Vec<Pillar>,
    pub last_progress_at: DateTime<Utc>,
    pub stagnation_count: u32,
}

impl ProgressionTracker {
    /// Rebuild the tracker from the interaction log.
    ///
    /// `last_progress_at` is when the user entered the current stage; topic
    /// coverage and asked questions are derived from the turns themselves.
    pub fn from_history(
        stage: FunnelStage,
        turns: &[Turn],
        last_progress_at: DateTime<Utc>,
    ) -> Self {
        let mut questions_asked = Vec::new();
        let mut topics_covered: Vec<Pillar> = Vec::new();

        for turn in turns {
            match turn.role {
                TurnRole::Assistant => {
                    if let Some(question) = normalize_question(&turn.content) {
                        questions_asked.push(question);
                    }
                }
                TurnRole::User | TurnRole::System => {}
            }
            for pillar in topics_in(&turn.content) {
                if !topics_covered.contains(&pillar) {
                    topics_covered.push(pillar);
                }
            }
        }

        Self {
            stage,
            substage: 0,
            questions_asked,
            topics_covered,
            last_progress_at,
            stagnation_count: 0,
        }
    }

    pub fn coverage_ratio(&self) -> f32 {
        self.topics_covered.len() as f32 / Pillar::ALL.len() as f32
    }
}

/// Thresholds for the evaluator, defaulting to the service-wide constants
#[derive(Debug, Clone)]
pub struct ProgressionPolicy {
    pub stagnation_timeout: Duration,
    pub repeat_window: usize,
    pub coverage_threshold: f32,
}

impl Default for ProgressionPolicy {
    fn default() -> Self {
        use coach_config::constants::progression;
        Self {
            stagnation_timeout: Duration::from_secs(progression::STAGNATION_TIMEOUT_SECS),
            repeat_window: progression::REPEAT_WINDOW,
            coverage_threshold: progression::TOPIC_COVERAGE_THRESHOLD,
        }
    }
}

impl ProgressionPolicy {
    pub fn from_settings(settings: &coach_config::FunnelSettings) -> Self {
        Self {
            stagnation_timeout: Duration::from_secs(settings.stagnation_timeout_secs),
            repeat_window: settings.repeat_window,
            coverage_threshold: settings.topic_coverage_threshold,
        }
    }

    /// Pure decision: must the conversation be force-advanced?
    ///
    /// OR of four independent heuristics; no side effects. The caller owns
    /// mutating the stage on `true`.
    pub fn should_force_progression(
        &self,
        tracker: &ProgressionTracker,
        user_message: &str,
        _ai_reply: &str,
    ) -> bool {
        // 1. Stagnation: too long since the stage last moved
        let stalled = Utc::now()
            .signed_duration_since(tracker.last_progress_at)
            .to_std()
            .map(|elapsed| elapsed > self.stagnation_timeout)
            .unwrap_or(false);
        if stalled {
            return true;
        }

        // 2. Repetition: the trailing window of asked questions is all the
        //    same token (naive signal, not semantic)
        if tracker.questions_asked.len() >= self.repeat_window {
            let tail = &tracker.questions_asked[tracker.questions_asked.len() - self.repeat_window..];
            if tail.windows(2).all(|w| w[0] == w[1]) {
                return true;
            }
        }

        // 3. Coverage: enough of the four pillars touched
        if tracker.coverage_ratio() >= self.coverage_threshold {
            return true;
        }

        // 4. Frustration: the user is telling us to move on
        FRUSTRATION_RE.is_match(user_message)
    }
}

/// Default-policy convenience wrapper
pub fn should_force_progression(
    tracker: &ProgressionTracker,
    user_message: &str,
    ai_reply: &str,
) -> bool {
    ProgressionPolicy::default().should_force_progression(tracker, user_message, ai_reply)
}

/// Outcome of the progression evaluation for one request
#[derive(Debug, Clone, Default)]
pub struct ProgressionCheck {
    pub should_advance: bool,
    pub target_stage: Option<FunnelStage>,
}

impl ProgressionCheck {
    pub fn evaluate(
        policy: &ProgressionPolicy,
        tracker: &ProgressionTracker,
        user_message: &str,
        ai_reply: &str,
    ) -> Self {
        let should_advance = policy.should_force_progression(tracker, user_message, ai_reply)
            && !tracker.stage.is_terminal();
        Self {
            should_advance,
            target_stage: if should_advance {
                tracker.stage.next()
            } else {
                None
            },
        }
    }
}

/// Assistant turns that end in a question become repetition tokens
fn normalize_question(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if !trimmed.contains('?') {
        return None;
    }
    // Last question sentence, folded for comparison
    let segment = trimmed
        .split('?')
        .filter(|s| !s.trim().is_empty())
        .next_back()?;
    // Drop any preamble sentences before the question itself
    let question = segment
        .rsplit(['.', '!'])
        .next()
        .unwrap_or(segment);
    Some(
        question
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Pillars mentioned in a turn, via topic labels and common synonyms
fn topics_in(content: &str) -> Vec<Pillar> {
    let lower = content.to_lowercase();
    let mut found = Vec::new();

    let synonyms: [(&[&str], Pillar); 4] = [
        (&["físico", "fisico", "treino", "exercício", "exercicio"], Pillar::Physical),
        (&["alimentar", "alimentação", "alimentacao", "dieta", "nutri"], Pillar::Nutritional),
        (&["emocional", "ansiedade", "estresse"], Pillar::Emotional),
        (&["espiritual", "fé", "oração", "meditação"], Pillar::Spiritual),
    ];

    for (words, pillar) in synonyms {
        if words.iter().any(|w| lower.contains(w)) {
            found.push(pillar);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn tracker(
        questions: &[&str],
        topics: &[Pillar],
        last_progress_at: DateTime<Utc>,
    ) -> ProgressionTracker {
        ProgressionTracker {
            stage: FunnelStage::Specialist,
            substage: 1,
            questions_asked: questions.iter().map(|q| q.to_string()).collect(),
            topics_covered: topics.to_vec(),
            last_progress_at,
            stagnation_count: 0,
        }
    }

    #[test]
    fn advances_on_stagnation_timeout() {
        let t = tracker(
            &["dor", "dor", "dor"],
            &[Pillar::Physical],
            Utc::now() - ChronoDuration::minutes(6),
        );
        assert!(should_force_progression(&t, "Estou cansado", "Qual sua dor?"));
    }

    #[test]
    fn advances_on_repeated_question() {
        let t = tracker(&["dor", "dor", "dor"], &[Pillar::Physical], Utc::now());
        assert!(should_force_progression(&t, "Tudo bem", "Qual sua dor?"));
    }

    #[test]
    fn advances_on_topic_coverage() {
        let t = tracker(
            &["dor", "alimento", "emoção", "espiritual"],
            &Pillar::ALL,
            Utc::now(),
        );
        assert!(should_force_progression(&t, "Ok", "Qual sua dor?"));
    }

    #[test]
    fn three_of_four_topics_is_enough() {
        let t = tracker(
            &["dor", "alimento"],
            &[Pillar::Physical, Pillar::Nutritional, Pillar::Emotional],
            Utc::now(),
        );
        assert!(should_force_progression(&t, "Ok", "Qual sua dor?"));
    }

    #[test]
    fn advances_on_user_frustration() {
        let t = tracker(
            &["dor", "alimento"],
            &[Pillar::Physical, Pillar::Nutritional],
            Utc::now(),
        );
        assert!(should_force_progression(
            &t,
            "Estou cansado de repetir",
            "Qual sua dor?"
        ));
    }

    #[test]
    fn frustration_match_is_case_insensitive() {
        let t = tracker(&[], &[], Utc::now());
        assert!(should_force_progression(&t, "JÁ FALEI isso", "ok"));
        assert!(should_force_progression(&t, "você repete demais", "ok"));
    }

    #[test]
    fn holds_when_nothing_applies() {
        let t = tracker(
            &["dor", "alimento"],
            &[Pillar::Physical, Pillar::Nutritional],
            Utc::now(),
        );
        assert!(!should_force_progression(&t, "Tudo certo", "Qual sua dor?"));
    }

    #[test]
    fn repetition_needs_a_full_window() {
        let t = tracker(&["dor", "dor"], &[Pillar::Physical], Utc::now());
        assert!(!should_force_progression(&t, "Tudo certo", "Qual sua dor?"));

        let mixed = tracker(&["sono", "dor", "dor"], &[Pillar::Physical], Utc::now());
        assert!(!should_force_progression(&mixed, "Tudo certo", "Qual sua dor?"));
    }

    #[test]
    fn check_targets_the_next_stage() {
        let policy = ProgressionPolicy::default();
        let t = tracker(&["dor", "dor", "dor"], &[], Utc::now());
        let check = ProgressionCheck::evaluate(&policy, &t, "Tudo bem", "Qual sua dor?");
        assert!(check.should_advance);
        assert_eq!(check.target_stage, Some(FunnelStage::Seller));
    }

    #[test]
    fn terminal_stage_never_advances() {
        let policy = ProgressionPolicy::default();
        let mut t = tracker(&["dor", "dor", "dor"], &Pillar::ALL, Utc::now());
        t.stage = FunnelStage::Partner;
        let check = ProgressionCheck::evaluate(&policy, &t, "já falei", "ok");
        assert!(!check.should_advance);
        assert_eq!(check.target_stage, None);
    }

    #[test]
    fn tracker_reconstruction_from_history() {
        let turns = vec![
            Turn::user("Tenho sentido muita ansiedade e dores no treino"),
            Turn::assistant("Entendi. Como está sua alimentação hoje?"),
            Turn::user("Como assim?"),
            Turn::assistant("Como está sua alimentação hoje?"),
        ];
        let t = ProgressionTracker::from_history(FunnelStage::Specialist, &turns, Utc::now());

        assert!(t.topics_covered.contains(&Pillar::Emotional));
        assert!(t.topics_covered.contains(&Pillar::Physical));
        assert!(t.topics_covered.contains(&Pillar::Nutritional));
        // Both assistant turns asked the same question
        assert_eq!(t.questions_asked.len(), 2);
        assert_eq!(t.questions_asked[0], t.questions_asked[1]);
    }
}
