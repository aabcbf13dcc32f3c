//! End-to-end engine scenarios over in-memory stores and a scripted LLM

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use coach_core::{CircuitBreaker, CircuitBreakerConfig, FunnelStage, Pillar, UserProfile};
use coach_funnel::{
    CoachEngine, EngineConfig, InboundMessage, PlanRegenerator, ProactiveEngine,
};
use coach_integrations::{IntegrationError, PlanGenerator};
use coach_llm::{FinishReason, GenerationResult, LlmBackend, LlmError, Message};
use coach_persistence::PersistenceLayer;

/// Scripted LLM: pops canned replies, errors when scripted to
struct ScriptedLlm {
    replies: Mutex<Vec<Result<String, String>>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies),
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn generate(&self, _messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let next = self
            .replies
            .lock()
            .pop()
            .unwrap_or(Ok(r#"{"response": "Oi!", "actions": []}"#.to_string()));
        match next {
            Ok(text) => Ok(GenerationResult {
                text,
                tokens: 10,
                total_time_ms: 5,
                finish_reason: FinishReason::Stop,
            }),
            Err(message) => Err(LlmError::Api(message)),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Generator that fails on one pillar, recording calls
struct ScriptedGenerator {
    fail_on: Option<Pillar>,
    calls: Mutex<Vec<Pillar>>,
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
                body: "generate-plan exploded".to_string(),
            });
        }
        Ok(())
    }
}

struct Harness {
    engine: CoachEngine,
    stores: PersistenceLayer,
    generator: Arc<ScriptedGenerator>,
    user_id: Uuid,
}

async fn harness(replies: Vec<Result<String, String>>, fail_on: Option<Pillar>) -> Harness {
    let stores = PersistenceLayer::in_memory();

    let mut profile = UserProfile::new(Uuid::new_v4());
    profile.phone = Some("5511999999999".to_string());
    profile.full_name = Some("João Pereira".to_string());
    stores.profiles.upsert(&profile).await.unwrap();

    let generator = Arc::new(ScriptedGenerator {
        fail_on,
        calls: Mutex::new(Vec::new()),
    });

    let regenerator = PlanRegenerator::new(
        stores.plans.clone(),
        stores.feedback.clone(),
        generator.clone(),
    );
    let proactive = ProactiveEngine::new(
        stores.gamification.clone(),
        stores.conversations.clone(),
        stores.feedback.clone(),
        stores.proactive.clone(),
        24,
    );

    let engine = CoachEngine::new(
        stores.clone(),
        Arc::new(ScriptedLlm::new(replies)),
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            threshold: 5,
            open_timeout: Duration::from_secs(30),
            name: "coach-llm".to_string(),
        })),
        regenerator,
        proactive,
        EngineConfig {
            proactive_enabled: false,
            ..Default::default()
        },
    );

    Harness {
        engine,
        stores,
        generator,
        user_id: profile.id,
    }
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        raw_phone: "5511999999999@s.whatsapp.net".to_string(),
        text: text.to_string(),
        event: "messages.upsert".to_string(),
    }
}

#[tokio::test]
async fn greeting_flows_to_a_reply_with_normalized_number() {
    let h = harness(
        vec![Ok(r#"{"response": "Oi João! Que bom te ver!", "actions": []}"#.to_string())],
        None,
    )
    .await;

    let reply = h.engine.handle_message(&inbound("oi")).await.unwrap();

    assert_eq!(reply.number, "5511999999999");
    assert_eq!(reply.reply, "Oi João! Que bom te ver!");
    assert_eq!(reply.stage, FunnelStage::Sdr);
    assert!(!reply.from_fallback);
    assert!(!reply.emergency);

    // Both turns landed in the conversation log, inbox got the raw row
    let turns = h.stores.conversations.recent(h.user_id, 10).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "oi");
}

#[tokio::test]
async fn unknown_phone_gets_onboarding_without_conversation_writes() {
    let h = harness(vec![], None).await;

    let reply = h
        .engine
        .handle_message(&InboundMessage {
            raw_phone: "5521888887777@s.whatsapp.net".to_string(),
            text: "oi".to_string(),
            event: "messages.upsert".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(reply.number, "5521888887777");
    assert!(reply.reply.contains("appvidasmart.com"));
    assert_eq!(reply.stage, FunnelStage::Sdr);
}

#[tokio::test]
async fn sdr_handover_reply_advances_the_stage() {
    let h = harness(
        vec![Ok(
            r#"{"response": "Entendi sua dor! Vou te conectar com nosso especialista.", "actions": []}"#
                .to_string(),
        )],
        None,
    )
    .await;

    let reply = h
        .engine
        .handle_message(&inbound("preciso de ajuda com meu peso, quero muito mudar"))
        .await
        .unwrap();

    assert_eq!(reply.stage, FunnelStage::Specialist);
    let current = h.stores.stages.current(h.user_id).await.unwrap().unwrap();
    assert_eq!(current.stage, FunnelStage::Specialist);
}

#[tokio::test]
async fn llm_failure_degrades_to_fallback_reply() {
    let h = harness(vec![Err("HTTP 500: upstream on fire".to_string())], None).await;

    let reply = h.engine.handle_message(&inbound("oi")).await.unwrap();

    assert!(reply.from_fallback);
    assert!(reply.reply.contains("probleminha técnico"));
    // Fallback replies still land in the conversation log
    let turns = h.stores.conversations.recent(h.user_id, 10).await.unwrap();
    assert_eq!(turns.len(), 2);
}

#[tokio::test]
async fn emergency_short_circuits_before_the_llm() {
    let h = harness(vec![], None).await;

    let reply = h
        .engine
        .handle_message(&inbound("não aguento mais, quero desaparecer"))
        .await
        .unwrap();

    assert!(reply.emergency);
    assert!(reply.reply.contains("CVV"));
    assert!(reply.reply.contains("188"));
    // Nothing was written to the conversation log
    let turns = h.stores.conversations.recent(h.user_id, 10).await.unwrap();
    assert!(turns.is_empty());
}

#[tokio::test]
async fn plan_regeneration_action_runs_and_reports() {
    let h = harness(
        vec![Ok(r#"{
            "response": "Claro! Vou ajustar seu plano físico agora.",
            "actions": [{"type": "regenerate_plan", "plan_type": "physical", "summary": "treino pesado"}]
        }"#
        .to_string())],
        None,
    )
    .await;

    let reply = h
        .engine
        .handle_message(&inbound("quero ajustar meu plano de treino"))
        .await
        .unwrap();

    assert!(reply.reply.contains("Vou ajustar seu plano físico"));
    assert!(reply.reply.contains("Regerei automaticamente o plano physical"));
    assert_eq!(h.generator.calls.lock().as_slice(), &[Pillar::Physical]);
}

#[tokio::test]
async fn failed_regeneration_names_the_type_and_keeps_partial_state() {
    // generate-plan fails on the second of the four types
    let h = harness(
        vec![Ok(r#"{
            "response": "Vou regenerar todos os seus planos!",
            "actions": [{"type": "regenerate_plan", "plan_type": "all"}]
        }"#
        .to_string())],
        Some(Pillar::Nutritional),
    )
    .await;

    let reply = h
        .engine
        .handle_message(&inbound("quero refazer meu plano completo"))
        .await
        .unwrap();

    assert!(reply.reply.contains("Erro ao regenerar plano nutritional"));
    // Batch aborted after the failure: physical ran, emotional/spiritual not
    assert_eq!(
        h.generator.calls.lock().as_slice(),
        &[Pillar::Physical, Pillar::Nutritional]
    );
}

#[tokio::test]
async fn qualified_bant_signals_advance_sdr_to_specialist() {
    let h = harness(
        vec![Ok(json!({"response": "Que bom saber!", "actions": []}).to_string())],
        None,
    )
    .await;

    // Budget + need + timeline in one message: score 75, qualified
    let reply = h
        .engine
        .handle_message(&inbound(
            "quanto custa? preciso muito resolver minha dor, quero começar hoje",
        ))
        .await
        .unwrap();

    assert_eq!(reply.stage, FunnelStage::Specialist);
    let current = h.stores.stages.current(h.user_id).await.unwrap().unwrap();
    assert_eq!(current.stage, FunnelStage::Specialist);
    assert!(current.bant_score >= 50);
}

#[tokio::test]
async fn frustration_forces_progression_into_the_next_stage() {
    let h = harness(
        vec![
            Ok(json!({"response": "Vamos em frente então!", "actions": []}).to_string()),
            Ok(json!({"response": "Me conta sua dor?", "actions": []}).to_string()),
        ],
        None,
    )
    .await;

    // First message establishes SDR
    h.engine.handle_message(&inbound("oi")).await.unwrap();
    // Frustration keyword fires heuristic 4 and forces SDR → Specialist
    let reply = h
        .engine
        .handle_message(&inbound("já falei tudo isso, estou cansado de repetir"))
        .await
        .unwrap();

    assert_eq!(reply.stage, FunnelStage::Specialist);
}
