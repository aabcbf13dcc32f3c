//! Conversation guard
//!
//! Cheap per-request checks that catch a conversation going off the rails
//! before the LLM is called: identical back-to-back assistant replies, a
//! stage detection with no confidence, or a user turn with no usable content.

use coach_core::{FunnelStage, Turn, TurnRole};

use crate::detection::StageDetection;

/// What the guard found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardIssue {
    /// The last two assistant replies are identical after folding
    RepeatedAssistantPrompt,
    /// Stage detection fired with confidence below the floor
    StagnantStage,
    /// The user sent nothing usable
    MissingUserResponse,
}

impl GuardIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepeatedAssistantPrompt => "repeated_assistant_prompt",
            Self::StagnantStage => "stagnant_stage",
            Self::MissingUserResponse => "missing_user_response",
        }
    }
}

/// Guard inputs for one request
pub struct GuardContext<'a> {
    pub message: &'a str,
    pub history: &'a [Turn],
    pub detection: &'a StageDetection,
    pub current_stage: FunnelStage,
}

/// Guard outcome
#[derive(Debug, Clone, Default)]
pub struct GuardDecision {
    pub issues: Vec<GuardIssue>,
    /// Prompt hints appended to the system prompt so the model changes tack
    pub hints: Vec<String>,
    /// Escalate to this stage (set on repeated assistant prompts)
    pub force_stage: Option<FunnelStage>,
    /// Hold the reply until the user actually says something
    pub block_reply: bool,
}

impl GuardDecision {
    pub fn issue_names(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.as_str().to_string()).collect()
    }
}

const MIN_DETECTION_CONFIDENCE: f32 = 0.2;

/// Evaluate the guard for one inbound message
pub fn evaluate_guard(ctx: &GuardContext<'_>) -> GuardDecision {
    let mut decision = GuardDecision::default();

    let assistant_turns: Vec<&Turn> = ctx
        .history
        .iter()
        .filter(|t| t.role == TurnRole::Assistant)
        .collect();
    if assistant_turns.len() >= 2 {
        let last_two = &assistant_turns[assistant_turns.len() - 2..];
        if sanitize(&last_two[0].content) == sanitize(&last_two[1].content) {
            decision.issues.push(GuardIssue::RepeatedAssistantPrompt);
            decision.hints.push(
                "As duas últimas respostas da IA foram idênticas; necessário mudar de abordagem."
                    .to_string(),
            );
        }
    }

    if ctx.detection.stage.is_none() || ctx.detection.confidence < MIN_DETECTION_CONFIDENCE {
        decision.issues.push(GuardIssue::StagnantStage);
        decision.hints.push(
            "Detecção de estágio com baixa confiança; considere heurísticas adicionais."
                .to_string(),
        );
    }

    let last_user = ctx.history.iter().rev().find(|t| t.role == TurnRole::User);
    let no_prior_content = last_user.map(|t| sanitize(&t.content).is_empty()).unwrap_or(true);
    if (no_prior_content && ctx.history.iter().any(|t| t.role == TurnRole::Assistant))
        || sanitize(ctx.message).is_empty()
    {
        decision.issues.push(GuardIssue::MissingUserResponse);
        decision.hints.push(
            "Usuário não enviou conteúdo útil; aguardar confirmação antes de seguir.".to_string(),
        );
    }

    if decision.issues.contains(&GuardIssue::RepeatedAssistantPrompt) {
        let base = ctx.detection.stage.unwrap_or(ctx.current_stage);
        decision.force_stage = Some(escalate(base));
    }

    if decision.issues.contains(&GuardIssue::MissingUserResponse) {
        decision.block_reply = true;
    }

    decision
}

/// One stage forward, saturating at the terminal stage
fn escalate(stage: FunnelStage) -> FunnelStage {
    stage.next().unwrap_or(stage)
}

fn sanitize(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detect_stage;

    fn detection_for(message: &str) -> StageDetection {
        detect_stage(message, &[])
    }

    #[test]
    fn repeated_assistant_replies_force_escalation() {
        let history = vec![
            Turn::user("oi"),
            Turn::assistant("Qual é o seu maior desafio?"),
            Turn::user("não sei"),
            Turn::assistant("Qual é o seu  maior desafio?"),
        ];
        let detection = detection_for("oi, bom dia");
        let decision = evaluate_guard(&GuardContext {
            message: "oi, bom dia",
            history: &history,
            detection: &detection,
            current_stage: FunnelStage::Sdr,
        });

        assert!(decision.issues.contains(&GuardIssue::RepeatedAssistantPrompt));
        assert_eq!(decision.force_stage, Some(FunnelStage::Specialist));
        assert!(!decision.block_reply);
    }

    #[test]
    fn empty_message_blocks_reply() {
        let detection = detection_for("   ");
        let decision = evaluate_guard(&GuardContext {
            message: "   ",
            history: &[],
            detection: &detection,
            current_stage: FunnelStage::Sdr,
        });

        assert!(decision.issues.contains(&GuardIssue::MissingUserResponse));
        assert!(decision.block_reply);
    }

    #[test]
    fn low_confidence_detection_is_flagged_without_forcing() {
        let detection = detection_for("xyzzy qwerty asdf jkl semordnilap retupmoc");
        let decision = evaluate_guard(&GuardContext {
            message: "xyzzy qwerty asdf jkl semordnilap retupmoc",
            history: &[Turn::user("oi"), Turn::assistant("Olá!")],
            detection: &detection,
            current_stage: FunnelStage::Specialist,
        });

        assert!(decision.issues.contains(&GuardIssue::StagnantStage));
        assert!(decision.force_stage.is_none());
        assert!(!decision.block_reply);
    }

    #[test]
    fn clean_conversation_passes() {
        let history = vec![
            Turn::user("oi"),
            Turn::assistant("Olá! Como você está?"),
            Turn::user("estou bem"),
            Turn::assistant("Que bom! Me conta mais?"),
        ];
        let detection = detection_for("oi, bom dia");
        let decision = evaluate_guard(&GuardContext {
            message: "oi, bom dia",
            history: &history,
            detection: &detection,
            current_stage: FunnelStage::Sdr,
        });

        assert!(decision.issues.is_empty());
        assert!(decision.force_stage.is_none());
        assert!(!decision.block_reply);
    }

    #[test]
    fn escalation_saturates_at_partner() {
        assert_eq!(escalate(FunnelStage::Partner), FunnelStage::Partner);
        assert_eq!(escalate(FunnelStage::Seller), FunnelStage::Partner);
    }
}
