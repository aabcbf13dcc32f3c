//! Funnel stage state machine
//!
//! Every user sits at exactly one stage of the conversational funnel:
//! SDR (qualification) → Specialist (anamnesis across the four pillars) →
//! Seller (conversion) → Partner (ongoing check-in loop, terminal).
//!
//! Transitions only move forward. The single backward path is an explicit
//! operational reset, which is a store-level operation and not a transition
//! this module will validate.

use serde::{Deserialize, Serialize};

/// Position in the conversational sales/coaching funnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FunnelStage {
    /// Initial qualification (budget/authority/need/timeline)
    #[default]
    Sdr,
    /// Deep-dive across the four life-area pillars
    Specialist,
    /// Trial offer and conversion
    Seller,
    /// Converted member, ongoing check-in loop
    Partner,
}

impl FunnelStage {
    /// Storage form used in the stage log and prompts
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Sdr => "sdr",
            FunnelStage::Specialist => "specialist",
            FunnelStage::Seller => "seller",
            FunnelStage::Partner => "partner",
        }
    }

    /// Parse the storage form. Unknown input yields `None` rather than a
    /// default so callers decide how to treat corrupt rows.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sdr" => Some(FunnelStage::Sdr),
            "specialist" => Some(FunnelStage::Specialist),
            "seller" => Some(FunnelStage::Seller),
            "partner" => Some(FunnelStage::Partner),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FunnelStage::Sdr => "SDR",
            FunnelStage::Specialist => "Specialist",
            FunnelStage::Seller => "Seller",
            FunnelStage::Partner => "Partner",
        }
    }

    /// Forward neighbor in the funnel, `None` at the terminal stage
    pub fn next(&self) -> Option<FunnelStage> {
        match self {
            FunnelStage::Sdr => Some(FunnelStage::Specialist),
            FunnelStage::Specialist => Some(FunnelStage::Seller),
            FunnelStage::Seller => Some(FunnelStage::Partner),
            FunnelStage::Partner => None,
        }
    }

    /// Stages reachable from this one in normal operation
    pub fn valid_transitions(&self) -> &'static [FunnelStage] {
        match self {
            FunnelStage::Sdr => &[FunnelStage::Specialist],
            FunnelStage::Specialist => &[FunnelStage::Seller],
            FunnelStage::Seller => &[FunnelStage::Partner],
            FunnelStage::Partner => &[],
        }
    }

    pub fn can_transition_to(&self, to: FunnelStage) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FunnelStage::Partner)
    }
}

/// Why a stage transition happened; recorded in the stage log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// The assistant reply contained a transition indicator phrase
    ReplyIndicator,
    /// The anti-loop progression evaluator forced advancement
    ForcedProgression,
    /// The conversation guard escalated after repeated identical replies
    GuardEscalation,
    /// Keyword-signal stage detection
    Detected,
    /// Operator action
    Manual,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplyIndicator => "reply_indicator",
            Self::ForcedProgression => "forced_progression",
            Self::GuardEscalation => "guard_escalation",
            Self::Detected => "detected",
            Self::Manual => "manual",
        }
    }
}

/// A single recorded stage change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: FunnelStage,
    pub to: FunnelStage,
    pub reason: TransitionReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        for stage in [
            FunnelStage::Sdr,
            FunnelStage::Specialist,
            FunnelStage::Seller,
            FunnelStage::Partner,
        ] {
            assert_eq!(FunnelStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(FunnelStage::parse("SELLER"), Some(FunnelStage::Seller));
        assert_eq!(FunnelStage::parse("vendedor"), None);
    }

    #[test]
    fn transitions_are_monotonic_forward() {
        assert!(FunnelStage::Sdr.can_transition_to(FunnelStage::Specialist));
        assert!(!FunnelStage::Sdr.can_transition_to(FunnelStage::Seller));
        assert!(!FunnelStage::Specialist.can_transition_to(FunnelStage::Sdr));
        assert!(FunnelStage::Partner.valid_transitions().is_empty());
        assert!(FunnelStage::Sdr < FunnelStage::Partner);
    }

    #[test]
    fn next_walks_the_funnel() {
        assert_eq!(FunnelStage::Sdr.next(), Some(FunnelStage::Specialist));
        assert_eq!(FunnelStage::Seller.next(), Some(FunnelStage::Partner));
        assert_eq!(FunnelStage::Partner.next(), None);
        assert!(FunnelStage::Partner.is_terminal());
    }
}
