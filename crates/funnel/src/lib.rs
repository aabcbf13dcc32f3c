//! Conversation funnel for the coach backend
//!
//! The per-message pipeline lives here: stage detection, the anti-loop
//! progression evaluator, the conversation guard, BANT scoring, reply-driven
//! stage transitions, the plan-regeneration orchestrator, the proactive
//! engine and the `CoachEngine` that ties them together.

pub mod bant;
pub mod detection;
pub mod emergency;
pub mod engine;
pub mod guard;
pub mod plans;
pub mod proactive;
pub mod progression;
pub mod transitions;

pub use bant::{BantScore, BantSignals};
pub use detection::{detect_stage, extract_pain_level, SignalSnapshot, StageDetection};
pub use emergency::{is_emergency, EMERGENCY_RESPONSE};
pub use engine::{CoachEngine, EngineConfig, EngineReply, InboundMessage};
pub use guard::{evaluate_guard, GuardContext, GuardDecision, GuardIssue};
pub use plans::{
    format_result_label, normalize_plan_types, PlanRegenerator, RegenerationOutcome,
};
pub use proactive::{ProactiveEngine, ProactiveMessage, ProactiveTrigger};
pub use progression::{
    should_force_progression, ProgressionCheck, ProgressionPolicy, ProgressionTracker,
};
pub use transitions::transition_from_reply;

use thiserror::Error;

/// Funnel errors
#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] coach_persistence::PersistenceError),

    #[error("LLM error: {0}")]
    Llm(#[from] coach_llm::LlmError),

    #[error("Integration error: {0}")]
    Integration(#[from] coach_integrations::IntegrationError),

    #[error("Invalid request: {0}")]
    Validation(String),
}

impl From<FunnelError> for coach_core::Error {
    fn from(err: FunnelError) -> Self {
        match err {
            FunnelError::Validation(msg) => coach_core::Error::Validation(msg),
            other => coach_core::Error::Funnel(other.to_string()),
        }
    }
}
