//! Structured coach reply parsing
//!
//! With `response_format: json_object` the model answers
//! `{"response": "...", "actions": [...]}`. Parsing is lenient: anything that
//! is not that shape is treated as a plain-text reply with no actions, so a
//! model that ignores the contract still reaches the user.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An automation request embedded in a model reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationAction {
    #[serde(rename = "type")]
    pub action_type: String,
    /// Plan selector: single type, list, or "all"
    #[serde(default)]
    pub plan_type: Option<Value>,
    /// Partial profile override merged onto the stored profile
    #[serde(default)]
    pub overrides: Option<Value>,
    /// Human-readable feedback recorded alongside the regeneration
    #[serde(default)]
    pub summary: Option<String>,
}

impl AutomationAction {
    pub fn is_plan_regeneration(&self) -> bool {
        self.action_type == "regenerate_plan"
    }
}

/// Parsed model output
#[derive(Debug, Clone, Deserialize)]
pub struct CoachReply {
    pub response: String,
    #[serde(default)]
    pub actions: Vec<AutomationAction>,
}

impl CoachReply {
    /// Parse raw model output, falling back to plain text
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(reply) = serde_json::from_str::<CoachReply>(trimmed) {
            if !reply.response.trim().is_empty() {
                return reply;
            }
        }

        // Some models wrap the object in a code fence even in JSON mode
        if let Some(inner) = strip_code_fence(trimmed) {
            if let Ok(reply) = serde_json::from_str::<CoachReply>(inner) {
                if !reply.response.trim().is_empty() {
                    return reply;
                }
            }
        }

        CoachReply {
            response: trimmed.to_string(),
            actions: Vec::new(),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        CoachReply {
            response: text.into(),
            actions: Vec::new(),
        }
    }
}

fn strip_code_fence(s: &str) -> Option<&str> {
    let s = s.strip_prefix("```json").or_else(|| s.strip_prefix("```"))?;
    let s = s.strip_suffix("```")?;
    Some(s.trim())
}
