//! Plan regeneration orchestrator
//!
//! Given a plan selector (one type, a list, or "all"), deactivate the active
//! plan rows, call the plan-generation service per type, and record the
//! triggering feedback as processed. The first failing type aborts the rest
//! of the batch; already-regenerated types stay regenerated (no compensating
//! transaction; the partial state is accepted and reported).

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use coach_core::Pillar;
use coach_integrations::PlanGenerator;
use coach_llm::AutomationAction;
use coach_persistence::{FeedbackStore, PlanStore};

use crate::FunnelError;

/// Normalize the raw selector into concrete pillars.
///
/// Strings are lowercased; `"all"`, arrays and anything unrecognized fall
/// back to all four types, a permissive default so a malformed request
/// never silently does nothing.
pub fn normalize_plan_types(raw: Option<&Value>) -> Vec<Pillar> {
    let candidates: Vec<String> = match raw {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(|s| s.to_lowercase()).unwrap_or_default())
            .collect(),
        Some(Value::String(s)) => {
            let normalized = s.to_lowercase();
            if normalized == "all" {
                return Pillar::ALL.to_vec();
            }
            vec![normalized]
        }
        _ => return Pillar::ALL.to_vec(),
    };

    let mut valid: Vec<Pillar> = candidates
        .iter()
        .filter_map(|c| Pillar::from_plan_type(c))
        .collect();
    valid.dedup();

    if valid.is_empty() {
        Pillar::ALL.to_vec()
    } else {
        valid
    }
}

/// Merge a partial override object onto the stored profile snapshot
pub fn apply_profile_overrides(profile: &Value, overrides: Option<&Value>) -> Value {
    let Some(Value::Object(overrides)) = overrides else {
        return profile.clone();
    };

    let mut merged = match profile {
        Value::Object(map) => map.clone(),
        _ => Default::default(),
    };
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

/// Human-readable label for the regenerated set
pub fn format_result_label(types: &[Pillar]) -> String {
    if types.len() == Pillar::ALL.len() {
        return "todos os seus planos".to_string();
    }
    if types.len() == 1 {
        return format!("o plano {}", types[0].as_str());
    }
    let names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
    format!("os planos {}", names.join(", "))
}

/// Result of one regeneration batch
#[derive(Debug, Clone)]
pub struct RegenerationOutcome {
    pub success: bool,
    /// Types regenerated before any failure
    pub regenerated: Vec<Pillar>,
    /// The type whose generation failed, when not successful
    pub failed: Option<Pillar>,
    /// User-facing summary in Portuguese
    pub message: String,
}

/// Deactivate-then-regenerate orchestration over the store and service seams
#[derive(Clone)]
pub struct PlanRegenerator {
    plans: Arc<dyn PlanStore>,
    feedback: Arc<dyn FeedbackStore>,
    generator: Arc<dyn PlanGenerator>,
}

impl PlanRegenerator {
    pub fn new(
        plans: Arc<dyn PlanStore>,
        feedback: Arc<dyn FeedbackStore>,
        generator: Arc<dyn PlanGenerator>,
    ) -> Self {
        Self {
            plans,
            feedback,
            generator,
        }
    }

    /// Run one regeneration batch for the user.
    ///
    /// Store failures propagate as errors; a generation failure is reported
    /// in the outcome, naming the failing type, with earlier types left in
    /// their regenerated state.
    pub async fn regenerate(
        &self,
        user_id: Uuid,
        profile_snapshot: &Value,
        action: &AutomationAction,
    ) -> Result<RegenerationOutcome, FunnelError> {
        let plan_types = normalize_plan_types(action.plan_type.as_ref());
        let profile = apply_profile_overrides(profile_snapshot, action.overrides.as_ref());

        let mut regenerated: Vec<Pillar> = Vec::new();

        for plan_type in &plan_types {
            self.plans.deactivate(user_id, *plan_type).await?;

            if let Err(err) = self.generator.generate_plan(user_id, *plan_type, &profile).await {
                tracing::error!(
                    user_id = %user_id,
                    plan_type = %plan_type,
                    error = %err,
                    "plan regeneration failed, aborting batch"
                );
                return Ok(RegenerationOutcome {
                    success: false,
                    regenerated,
                    failed: Some(*plan_type),
                    message: format!("Erro ao regenerar plano {}: {}", plan_type.as_str(), err),
                });
            }

            if let Some(summary) = &action.summary {
                self.feedback
                    .record_processed(user_id, *plan_type, summary)
                    .await?;
            }

            regenerated.push(*plan_type);
        }

        let label = format_result_label(&regenerated);
        Ok(RegenerationOutcome {
            success: true,
            regenerated,
            failed: None,
            message: format!(
                "✅ Pronto! Regerei automaticamente {}. Confere na aba \"Meu Plano\".",
                label
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coach_integrations::IntegrationError;
    use coach_persistence::{InMemoryFeedbackStore, InMemoryPlanStore, PlanRecord};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Scripted generator: fails on the configured pillar
    struct ScriptedGenerator {
        fail_on: Option<Pillar>,
        calls: Mutex<Vec<Pillar>>,
    }

    impl ScriptedGenerator {
        fn new(fail_on: Option<Pillar>) -> Self {
            Self {
                fail_on,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PlanGenerator for ScriptedGenerator {
        async fn generate_plan(
            &self,
            _user_id: Uuid,
            plan_type: Pillar,
            _user_profile: &Value,
        ) -> Result<(), IntegrationError> {
            self.calls.lock().push(plan_type);
            if self.fail_on == Some(plan_type) {
                return Err(IntegrationError::Api {
                    status: 500,
                    body: "generator down".to_string(),
                });
            }
            Ok(())
        }
    }

    fn active_plan(user_id: Uuid, plan_type: Pillar) -> PlanRecord {
        PlanRecord {
            plan_id: Uuid::new_v4(),
            user_id,
            plan_type,
            content: None,
            is_active: true,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn selector_normalization() {
        assert_eq!(normalize_plan_types(Some(&json!("all"))), Pillar::ALL.to_vec());
        assert_eq!(
            normalize_plan_types(Some(&json!("Physical"))),
            vec![Pillar::Physical]
        );
        assert_eq!(
            normalize_plan_types(Some(&json!(["nutritional", "emotional"]))),
            vec![Pillar::Nutritional, Pillar::Emotional]
        );
        // Unknown values fall back to everything
        assert_eq!(normalize_plan_types(Some(&json!("financial"))), Pillar::ALL.to_vec());
        assert_eq!(normalize_plan_types(Some(&json!(42))), Pillar::ALL.to_vec());
        assert_eq!(normalize_plan_types(None), Pillar::ALL.to_vec());
        // Valid entries survive a partially invalid list
        assert_eq!(
            normalize_plan_types(Some(&json!(["spiritual", "bogus"]))),
            vec![Pillar::Spiritual]
        );
    }

    #[test]
    fn override_merge_is_shallow() {
        let profile = json!({"goal_type": "emagrecer", "age": 30});
        let merged = apply_profile_overrides(&profile, Some(&json!({"age": 31, "gender": "f"})));
        assert_eq!(merged["goal_type"], "emagrecer");
        assert_eq!(merged["age"], 31);
        assert_eq!(merged["gender"], "f");

        // Non-object overrides leave the profile untouched
        let untouched = apply_profile_overrides(&profile, Some(&json!("oops")));
        assert_eq!(untouched, profile);
    }

    #[test]
    fn result_labels() {
        assert_eq!(format_result_label(&Pillar::ALL), "todos os seus planos");
        assert_eq!(format_result_label(&[Pillar::Physical]), "o plano physical");
        assert_eq!(
            format_result_label(&[Pillar::Physical, Pillar::Emotional]),
            "os planos physical, emotional"
        );
    }

    #[tokio::test]
    async fn successful_batch_regenerates_and_records_feedback() {
        let plans = Arc::new(InMemoryPlanStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let generator = Arc::new(ScriptedGenerator::new(None));
        let user_id = Uuid::new_v4();
        plans.insert(&active_plan(user_id, Pillar::Physical)).await.unwrap();

        let regenerator = PlanRegenerator::new(plans.clone(), feedback.clone(), generator.clone());
        let outcome = regenerator
            .regenerate(
                user_id,
                &json!({}),
                &AutomationAction {
                    action_type: "regenerate_plan".to_string(),
                    plan_type: Some(json!("physical")),
                    overrides: None,
                    summary: Some("treino pesado".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.regenerated, vec![Pillar::Physical]);
        assert!(outcome.message.contains("o plano physical"));
        // Old plan deactivated before generation
        assert!(plans.active_plan_types(user_id).await.unwrap().is_empty());
        // Feedback recorded as processed
        let recent = feedback
            .recent(user_id, chrono::Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn failure_aborts_batch_and_names_the_type() {
        let plans = Arc::new(InMemoryPlanStore::new());
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        // Second of four types fails
        let generator = Arc::new(ScriptedGenerator::new(Some(Pillar::Nutritional)));
        let user_id = Uuid::new_v4();
        for pillar in Pillar::ALL {
            plans.insert(&active_plan(user_id, pillar)).await.unwrap();
        }

        let regenerator = PlanRegenerator::new(plans.clone(), feedback, generator.clone());
        let outcome = regenerator
            .regenerate(
                user_id,
                &json!({}),
                &AutomationAction {
                    action_type: "regenerate_plan".to_string(),
                    plan_type: Some(json!("all")),
                    overrides: None,
                    summary: None,
                },
            )
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.failed, Some(Pillar::Nutritional));
        assert!(outcome.message.contains("nutritional"));
        // The first type completed and stays completed (no rollback)
        assert_eq!(outcome.regenerated, vec![Pillar::Physical]);
        assert_eq!(
            generator.calls.lock().as_slice(),
            &[Pillar::Physical, Pillar::Nutritional]
        );
        // Both attempted types were deactivated; the remaining two untouched
        let still_active = plans.active_plan_types(user_id).await.unwrap();
        assert_eq!(still_active, vec![Pillar::Emotional, Pillar::Spiritual]);
    }
}
