//! Per-message funnel orchestration
//!
//! One `handle_message` call is the whole request path the webhook drives:
//! log the raw message, find the user, screen for emergencies, rebuild the
//! progression tracker from the stored log, run guard + detection + the
//! anti-loop evaluator, generate the reply through the LLM circuit breaker,
//! resolve the stage transition, execute reply actions and check the
//! proactive engine.
//!
//! The engine holds no per-conversation state: everything is re-read from
//! the stores on each call. The only cross-request state is the injected
//! circuit breaker.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use coach_core::{
    CircuitBreaker, FunnelStage, TransitionReason, Turn, TurnRole, UserProfile,
};
use coach_integrations::{normalize_phone, phone_candidates};
use coach_llm::{CoachReply, LlmBackend, PromptBuilder, PromptContext};
use coach_persistence::{
    GuardMetricRecord, InteractionRecord, PersistenceLayer, StageRecord, WhatsAppMessageRecord,
};

use crate::bant::BantSignals;
use crate::detection::detect_stage;
use crate::emergency::{is_emergency, EMERGENCY_RESPONSE};
use crate::guard::{evaluate_guard, GuardContext};
use crate::plans::PlanRegenerator;
use crate::proactive::ProactiveEngine;
use crate::progression::{ProgressionCheck, ProgressionPolicy, ProgressionTracker};
use crate::transitions::transition_from_reply;
use crate::FunnelError;

/// Static reply when the LLM circuit is open or the call failed
pub const LLM_FALLBACK_REPLY: &str =
    "Desculpa, tive um probleminha técnico agora. 🙏 Me manda sua mensagem de novo em \
     instantes que eu te respondo com carinho!";

/// Reply for phones with no matching profile
const ONBOARDING_REPLY: &str =
    "Oi! 👋 Que bom te ver por aqui! Ainda não encontrei seu cadastro no Vida Smart Coach. \
     Acesse https://appvidasmart.com para criar sua conta e a gente começa juntos!";

/// Gentle nudge when the guard blocks the reply for lack of content
const BLOCKED_REPLY: &str =
    "Não consegui te entender dessa vez. 😊 Me conta com suas palavras o que você precisa?";

/// How many turns are loaded for tracker reconstruction
const HISTORY_LOAD: usize = 20;

/// One inbound message after webhook-level filtering
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Raw phone as received (may carry the WhatsApp JID suffix)
    pub raw_phone: String,
    pub text: String,
    pub event: String,
}

/// What the caller sends back to the user
#[derive(Debug, Clone)]
pub struct EngineReply {
    /// Normalized destination number
    pub number: String,
    pub reply: String,
    pub stage: FunnelStage,
    pub from_fallback: bool,
    pub emergency: bool,
    /// At most one proactive follow-up message
    pub proactive: Option<String>,
}

/// Engine construction parameters
#[derive(Clone)]
pub struct EngineConfig {
    pub funnel: coach_config::FunnelSettings,
    pub proactive_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            funnel: coach_config::FunnelSettings::default(),
            proactive_enabled: true,
        }
    }
}

/// The conversation funnel controller
pub struct CoachEngine {
    stores: PersistenceLayer,
    llm: Arc<dyn LlmBackend>,
    llm_breaker: Arc<CircuitBreaker>,
    regenerator: PlanRegenerator,
    proactive: ProactiveEngine,
    prompt_builder: PromptBuilder,
    policy: ProgressionPolicy,
    config: EngineConfig,
}

impl CoachEngine {
    pub fn new(
        stores: PersistenceLayer,
        llm: Arc<dyn LlmBackend>,
        llm_breaker: Arc<CircuitBreaker>,
        regenerator: PlanRegenerator,
        proactive: ProactiveEngine,
        config: EngineConfig,
    ) -> Self {
        Self {
            llm,
            llm_breaker,
            regenerator,
            proactive,
            prompt_builder: PromptBuilder::new(config.funnel.history_window),
            policy: ProgressionPolicy::from_settings(&config.funnel),
            stores,
            config,
        }
    }

    /// Process one inbound WhatsApp message end to end
    pub async fn handle_message(&self, inbound: &InboundMessage) -> Result<EngineReply, FunnelError> {
        let number = normalize_phone(&inbound.raw_phone)
            .ok_or_else(|| FunnelError::Validation("phone has no digits".to_string()))?;

        // Raw inbox row first, keyed by the phone as received
        self.stores
            .messages
            .append(&WhatsAppMessageRecord::inbound(
                inbound.raw_phone.clone(),
                inbound.text.clone(),
                inbound.event.clone(),
            ))
            .await?;

        let profile = self
            .stores
            .profiles
            .find_by_phone(&phone_candidates(&inbound.raw_phone))
            .await?;

        // Emergency screen runs before everything, known user or not
        if is_emergency(&inbound.text) {
            tracing::warn!(phone = %number, "emergency protocol activated");
            self.stores
                .messages
                .append_emergency(&inbound.raw_phone, profile.as_ref().map(|p| p.id), &inbound.text)
                .await?;
            return Ok(EngineReply {
                number,
                reply: EMERGENCY_RESPONSE.to_string(),
                stage: FunnelStage::Sdr,
                from_fallback: false,
                emergency: true,
                proactive: None,
            });
        }

        let Some(profile) = profile else {
            tracing::info!(phone = %number, "no profile for phone, sending onboarding reply");
            return Ok(EngineReply {
                number,
                reply: ONBOARDING_REPLY.to_string(),
                stage: FunnelStage::Sdr,
                from_fallback: false,
                emergency: false,
                proactive: None,
            });
        };

        self.handle_user_message(profile, number, &inbound.text).await
    }

    async fn handle_user_message(
        &self,
        profile: UserProfile,
        number: String,
        text: &str,
    ) -> Result<EngineReply, FunnelError> {
        // A missing stage row means a fresh SDR entrant, never an error
        let stage_record = match self.stores.stages.current(profile.id).await? {
            Some(record) => record,
            None => {
                let initial = StageRecord::initial(profile.id);
                self.stores.stages.record(&initial).await?;
                initial
            }
        };
        let current_stage = stage_record.stage;

        let history = self.stores.conversations.recent(profile.id, HISTORY_LOAD).await?;

        let detection = detect_stage(text, &history);
        let guard = evaluate_guard(&GuardContext {
            message: text,
            history: &history,
            detection: &detection,
            current_stage,
        });

        if guard.block_reply {
            self.record_guard_metric(&profile, current_stage, current_stage, &guard, "block")
                .await;
            return Ok(EngineReply {
                number,
                reply: BLOCKED_REPLY.to_string(),
                stage: current_stage,
                from_fallback: false,
                emergency: false,
                proactive: None,
            });
        }

        // Tracker is a value rebuilt from the log; the stage row's timestamp
        // is when this stage was entered
        let tracker =
            ProgressionTracker::from_history(current_stage, &history, stage_record.created_at);
        let progression = ProgressionCheck::evaluate(&self.policy, &tracker, text, "");

        // BANT only accumulates while qualifying
        let bant = if current_stage == FunnelStage::Sdr {
            let prior: BantSignals = stage_record
                .metadata
                .get("bant")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            Some(prior.merge(BantSignals::detect(text)))
        } else {
            None
        };

        // The stage fed to the prompt is the target when progression forces
        let processing_stage = progression
            .target_stage
            .filter(|_| progression.should_advance)
            .unwrap_or(current_stage);

        let reply = self.generate_reply(&profile, processing_stage, &guard.hints, &history, text).await?;

        let parsed = if reply.from_fallback {
            CoachReply::plain(reply.text.clone())
        } else {
            CoachReply::parse(&reply.text)
        };
        let mut reply_text = parsed.response.clone();

        // Resolve the transition: forced progression > guard escalation >
        // reply indicator > BANT qualification; all validated against the
        // forward-only machine
        let transition = self
            .resolve_transition(current_stage, &progression, guard.force_stage, &parsed.response)
            .or_else(|| {
                // Qualified BANT alone moves an SDR on to the specialist
                match (current_stage, bant) {
                    (FunnelStage::Sdr, Some(signals)) if signals.score().is_qualified() => {
                        Some((FunnelStage::Specialist, TransitionReason::Detected))
                    }
                    _ => None,
                }
            });

        let bant_score = bant.map(|b| b.score().0).unwrap_or(stage_record.bant_score);
        let mut metadata = stage_record.metadata.clone();
        if let Some(bant) = bant {
            if !metadata.is_object() {
                metadata = json!({});
            }
            metadata["bant"] = serde_json::to_value(bant).unwrap_or(json!({}));
        }

        let new_stage = match transition {
            Some((to, reason)) => {
                self.stores
                    .stages
                    .record(&StageRecord {
                        user_id: profile.id,
                        stage: to,
                        bant_score,
                        metadata: metadata.clone(),
                        reason,
                        created_at: Utc::now(),
                    })
                    .await?;
                to
            }
            None => {
                // Same stage; persist BANT/metadata movement when it changed
                if bant_score != stage_record.bant_score {
                    self.stores
                        .stages
                        .record(&StageRecord {
                            user_id: profile.id,
                            stage: current_stage,
                            bant_score,
                            metadata: metadata.clone(),
                            reason: stage_record.reason,
                            created_at: Utc::now(),
                        })
                        .await?;
                }
                current_stage
            }
        };

        if !guard.issues.is_empty() {
            self.record_guard_metric(&profile, current_stage, new_stage, &guard, "reply").await;
        }

        // Reply actions (plan regeneration) run after the transition settles
        for action in &parsed.actions {
            if !action.is_plan_regeneration() {
                tracing::debug!(action = %action.action_type, "ignoring unknown reply action");
                continue;
            }
            let snapshot = serde_json::to_value(&profile).unwrap_or(json!({}));
            let outcome = self.regenerator.regenerate(profile.id, &snapshot, action).await?;
            reply_text.push_str("\n\n");
            reply_text.push_str(&outcome.message);
            if !outcome.success {
                break;
            }
        }

        // Append-only interaction log: user turn then assistant turn
        self.stores
            .conversations
            .append(&InteractionRecord::new(profile.id, TurnRole::User, text, current_stage))
            .await?;
        self.stores
            .conversations
            .append(&InteractionRecord::new(
                profile.id,
                TurnRole::Assistant,
                reply_text.clone(),
                new_stage,
            ))
            .await?;

        // The user answered; settle any outstanding proactive message
        self.stores.proactive.mark_responded(profile.id).await?;

        // Opportunistic proactive check; skipped when degraded
        let proactive = if self.config.proactive_enabled && !reply.from_fallback {
            self.proactive
                .check_opportunity(&profile, Utc::now())
                .await?
                .map(|m| m.message)
        } else {
            None
        };

        Ok(EngineReply {
            number,
            reply: reply_text,
            stage: new_stage,
            from_fallback: reply.from_fallback,
            emergency: false,
            proactive,
        })
    }

    async fn generate_reply(
        &self,
        profile: &UserProfile,
        stage: FunnelStage,
        hints: &[String],
        history: &[Turn],
        text: &str,
    ) -> Result<ReplyOutcome, FunnelError> {
        let gamification = self.stores.gamification.summary(profile.id).await?;
        let active_plans = self.stores.plans.active_plan_types(profile.id).await?;

        let ctx = PromptContext {
            profile: profile.clone(),
            stage,
            gamification,
            active_plans,
            hints: hints.to_vec(),
        };
        let messages = self.prompt_builder.build(&ctx, history, text);

        let llm = self.llm.clone();
        let outcome = self
            .llm_breaker
            .execute(
                || async move { llm.generate(&messages).await.map(|r| r.text) },
                || async { Ok(LLM_FALLBACK_REPLY.to_string()) },
            )
            .await?;

        Ok(ReplyOutcome {
            text: outcome.result,
            from_fallback: outcome.from_fallback,
        })
    }

    fn resolve_transition(
        &self,
        current: FunnelStage,
        progression: &ProgressionCheck,
        guard_stage: Option<FunnelStage>,
        reply: &str,
    ) -> Option<(FunnelStage, TransitionReason)> {
        let candidate = if progression.should_advance {
            progression
                .target_stage
                .map(|to| (to, TransitionReason::ForcedProgression))
        } else if let Some(to) = guard_stage.filter(|to| *to != current) {
            Some((to, TransitionReason::GuardEscalation))
        } else {
            transition_from_reply(reply, current).map(|to| (to, TransitionReason::ReplyIndicator))
        };

        candidate.filter(|(to, _)| current.can_transition_to(*to))
    }

    async fn record_guard_metric(
        &self,
        profile: &UserProfile,
        before: FunnelStage,
        after: FunnelStage,
        guard: &crate::guard::GuardDecision,
        action: &str,
    ) {
        let record = GuardMetricRecord {
            user_id: profile.id,
            stage_before: before.as_str().to_string(),
            stage_after: after.as_str().to_string(),
            issues: guard.issue_names(),
            hints: guard.hints.clone(),
            action: action.to_string(),
            created_at: Utc::now(),
        };
        // Metrics are best-effort: a write failure never fails the request
        if let Err(err) = self.stores.metrics.record_guard_metric(&record).await {
            tracing::error!(user_id = %profile.id, error = %err, "guard metric insert failed");
        }
    }
}

struct ReplyOutcome {
    text: String,
    from_fallback: bool,
}
