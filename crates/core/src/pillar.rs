//! The four life-area pillars
//!
//! Plans, plan feedback and conversation-topic coverage all range over the
//! same closed universe: physical, nutritional, emotional, spiritual. The
//! wire form is English (plan types), the conversational form is Portuguese
//! (topic tokens extracted from chat).

use serde::{Deserialize, Serialize};

/// One of the four coached life areas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Physical,
    Nutritional,
    Emotional,
    Spiritual,
}

impl Pillar {
    /// The fixed universe; topic coverage is measured against its length
    pub const ALL: [Pillar; 4] = [
        Pillar::Physical,
        Pillar::Nutritional,
        Pillar::Emotional,
        Pillar::Spiritual,
    ];

    /// Plan-type wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            Pillar::Physical => "physical",
            Pillar::Nutritional => "nutritional",
            Pillar::Emotional => "emotional",
            Pillar::Spiritual => "spiritual",
        }
    }

    /// Conversation-topic form used in chat and coverage tracking
    pub fn label_pt(&self) -> &'static str {
        match self {
            Pillar::Physical => "físico",
            Pillar::Nutritional => "alimentar",
            Pillar::Emotional => "emocional",
            Pillar::Spiritual => "espiritual",
        }
    }

    pub fn from_plan_type(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "physical" => Some(Pillar::Physical),
            "nutritional" => Some(Pillar::Nutritional),
            "emotional" => Some(Pillar::Emotional),
            "spiritual" => Some(Pillar::Spiritual),
            _ => None,
        }
    }

    /// Parse the Portuguese topic token. Accepts the unaccented spellings
    /// that show up in real WhatsApp text.
    pub fn from_topic(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "físico" | "fisico" => Some(Pillar::Physical),
            "alimentar" | "nutricional" => Some(Pillar::Nutritional),
            "emocional" => Some(Pillar::Emotional),
            "espiritual" => Some(Pillar::Spiritual),
            _ => None,
        }
    }
}

impl std::fmt::Display for Pillar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_forms_parse() {
        for pillar in Pillar::ALL {
            assert_eq!(Pillar::from_plan_type(pillar.as_str()), Some(pillar));
            assert_eq!(Pillar::from_topic(pillar.label_pt()), Some(pillar));
        }
        assert_eq!(Pillar::from_topic("fisico"), Some(Pillar::Physical));
        assert_eq!(Pillar::from_plan_type("financial"), None);
    }
}
