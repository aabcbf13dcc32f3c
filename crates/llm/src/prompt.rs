//! Prompt building for the coach assistant
//!
//! The assistant speaks Brazilian Portuguese in a WhatsApp register: warm,
//! curious, never bullet lists. Each funnel stage gets its own persona block
//! layered over a shared base, plus a user-context section assembled from the
//! profile, gamification summary and active plans.

use chrono::Utc;

use coach_core::{FunnelStage, GamificationSummary, Pillar, Turn, TurnRole, UserProfile};

/// Message role for completion calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a completion request
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Where the user is in their journey, independent of the funnel stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMoment {
    New,
    Active,
    Inactive,
}

impl ClientMoment {
    /// Signed up within a day → new; more than a week old with an empty
    /// history → inactive; everything else → active.
    pub fn classify(profile: &UserProfile, history_len: usize) -> Self {
        let days = profile.days_since_signup(Utc::now());
        if days <= 1 {
            ClientMoment::New
        } else if days > 7 && history_len == 0 {
            ClientMoment::Inactive
        } else {
            ClientMoment::Active
        }
    }

    pub fn label_pt(&self) -> &'static str {
        match self {
            ClientMoment::New => "Cliente novo",
            ClientMoment::Active => "Cliente ativo",
            ClientMoment::Inactive => "Cliente inativo",
        }
    }
}

/// Everything the builder needs for one request
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub profile: UserProfile,
    pub stage: FunnelStage,
    pub gamification: Option<GamificationSummary>,
    /// Pillars that currently have an active plan
    pub active_plans: Vec<Pillar>,
    /// Guard hints appended verbatim so the model changes its approach
    pub hints: Vec<String>,
}

/// Builds the message list for one completion call
pub struct PromptBuilder {
    history_window: usize,
}

impl PromptBuilder {
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    /// Assemble system prompt + trailing history + the new user message
    pub fn build(&self, ctx: &PromptContext, history: &[Turn], user_message: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history_window + 2);
        messages.push(Message::system(self.system_prompt(ctx, history)));

        let window_start = history.len().saturating_sub(self.history_window);
        for turn in &history[window_start..] {
            match turn.role {
                TurnRole::User => messages.push(Message::user(turn.content.clone())),
                TurnRole::Assistant => messages.push(Message::assistant(turn.content.clone())),
                TurnRole::System => {}
            }
        }

        messages.push(Message::user(user_message.to_string()));
        messages
    }

    fn system_prompt(&self, ctx: &PromptContext, history: &[Turn]) -> String {
        let name = ctx.profile.full_name.as_deref().unwrap_or("querido(a)");
        let moment = ClientMoment::classify(&ctx.profile, history.len());
        let psych = if ctx.profile.is_detailed() {
            "Perfil analítico - gosta de detalhes"
        } else {
            "Perfil expressivo - gosta de conexão emocional"
        };

        let mut prompt = format!(
            "Você é a IA Coach do Vida Smart Coach. Você é uma pessoa brasileira real, \
             calorosa e consultiva.\n\n\
             IMPORTANTE: Você NUNCA usa listas com \"-\" ou bullets. Você conversa \
             naturalmente como no WhatsApp.\n\n\
             NOME DO CLIENTE: {name}\n\
             PERFIL DO CLIENTE: {psych}\n\
             MOMENTO: {moment}\n",
            name = name,
            psych = psych,
            moment = moment.label_pt(),
        );

        prompt.push_str(&self.context_block(ctx));
        prompt.push('\n');
        prompt.push_str(self.stage_block(ctx.stage));

        if let Some(cultural) = &ctx.profile.cultural_context {
            prompt.push_str(&format!(
                "\nCONTEXTO CULTURAL: {}. Adapte seu linguajar e exemplos para essa região.",
                cultural
            ));
        }
        if let Some(belief) = &ctx.profile.spiritual_belief {
            prompt.push_str(&format!(
                "\nCRENÇA ESPIRITUAL: {}. Incorpore conceitos alinhados de forma sutil e respeitosa.",
                belief
            ));
        }

        for hint in &ctx.hints {
            prompt.push_str(&format!("\nATENÇÃO: {}", hint));
        }

        prompt.push_str(
            "\n\nFORMATO DA RESPOSTA: responda SEMPRE com um objeto JSON no formato \
             {\"response\": \"sua mensagem\", \"actions\": []}. Quando o cliente pedir \
             para ajustar ou regenerar um plano, inclua uma ação \
             {\"type\": \"regenerate_plan\", \"plan_type\": \"physical|nutritional|emotional|spiritual|all\", \
             \"summary\": \"motivo\"}.",
        );

        prompt.push_str(
            "\n\nREGRA DE OURO: Conversa natural, curiosa, sem listas. Como uma amiga \
             brasileira que realmente se importa.",
        );

        prompt
    }

    /// Profile + gamification + plan context, compressed into one block
    fn context_block(&self, ctx: &PromptContext) -> String {
        let profile = &ctx.profile;
        let mut block = format!(
            "CONTEXTO: objetivo: {}, tempo no app: {} dias",
            profile.goal_type.as_deref().unwrap_or("saúde geral"),
            profile.days_since_signup(Utc::now()).max(0),
        );

        if let Some(age) = profile.age {
            block.push_str(&format!(", {} anos", age));
        }
        if let (Some(current), Some(target)) = (profile.current_weight_kg, profile.target_weight_kg) {
            block.push_str(&format!(", peso atual {:.0}kg, meta {:.0}kg", current, target));
        }

        if let Some(game) = &ctx.gamification {
            block.push_str(&format!(
                "\nGAMIFICAÇÃO: {} XP, nível {}, sequência atual de {} dias",
                game.total_points, game.level, game.current_streak
            ));
        }

        if ctx.active_plans.is_empty() {
            block.push_str("\nPLANOS: nenhum plano ativo ainda");
        } else {
            let labels: Vec<&str> = ctx.active_plans.iter().map(|p| p.label_pt()).collect();
            block.push_str(&format!("\nPLANOS ATIVOS: {}", labels.join(", ")));
        }

        block.push('\n');
        block
    }

    fn stage_block(&self, stage: FunnelStage) -> &'static str {
        match stage {
            FunnelStage::Sdr => {
                "SUA MISSÃO (SDR): descobrir a dor específica da pessoa e qualificá-la. \
                 Entenda com curiosidade genuína o que ela busca, se é ela quem decide, \
                 quando quer começar e o que já tentou. Quando sentir que entendeu a dor \
                 e a pessoa está pronta, diga que vou te conectar com nosso especialista."
            }
            FunnelStage::Specialist => {
                "SUA MISSÃO (Especialista): fazer a anamnese dos quatro pilares: físico, \
                 alimentar, emocional e espiritual. Uma pergunta por vez, sem repetir o que \
                 já foi respondido. Cubra os quatro pilares antes de propor o próximo passo. \
                 Quando a anamnese estiver completa, convide a pessoa a testar gratuitamente \
                 e avise que os planos foram gerados."
            }
            FunnelStage::Seller => {
                "SUA MISSÃO (Vendas): conectar a dor da pessoa às soluções do Vida Smart \
                 Coach, resolver objeções com empatia e conduzir à assinatura. Sem pressão. \
                 Quando o cadastro estiver confirmado, dê as boas-vindas: bem-vindo ao Vida \
                 Smart Coach."
            }
            FunnelStage::Partner => {
                "SUA MISSÃO (Parceiro): acompanhar o dia a dia. Pergunte como foi o treino, \
                 a alimentação, o sono. Celebre pontos e sequências, sugira o check-in diário \
                 e ajude a ajustar os planos quando algo não estiver funcionando."
            }
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(coach_config::constants::progression::HISTORY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn profile() -> UserProfile {
        let mut p = UserProfile::new(Uuid::new_v4());
        p.full_name = Some("João Pereira".to_string());
        p
    }

    fn ctx(stage: FunnelStage) -> PromptContext {
        PromptContext {
            profile: profile(),
            stage,
            gamification: None,
            active_plans: vec![],
            hints: vec![],
        }
    }

    #[test]
    fn system_prompt_carries_stage_persona() {
        let builder = PromptBuilder::new(6);
        let messages = builder.build(&ctx(FunnelStage::Specialist), &[], "oi");
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("quatro pilares"));
        assert!(messages[0].content.contains("João Pereira"));
        // JSON contract is always present
        assert!(messages[0].content.contains("regenerate_plan"));
    }

    #[test]
    fn history_window_is_applied() {
        let builder = PromptBuilder::new(2);
        let history: Vec<Turn> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user(format!("u{}", i))
                } else {
                    Turn::assistant(format!("a{}", i))
                }
            })
            .collect();

        let messages = builder.build(&ctx(FunnelStage::Sdr), &history, "nova mensagem");
        // system + 2 history + current user message
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "u8");
        assert_eq!(messages.last().unwrap().content, "nova mensagem");
    }

    #[test]
    fn client_moment_classification() {
        let mut p = profile();
        assert_eq!(ClientMoment::classify(&p, 0), ClientMoment::New);

        p.created_at = Utc::now() - Duration::days(10);
        assert_eq!(ClientMoment::classify(&p, 0), ClientMoment::Inactive);
        assert_eq!(ClientMoment::classify(&p, 4), ClientMoment::Active);
    }

    #[test]
    fn hints_are_appended() {
        let builder = PromptBuilder::new(6);
        let mut context = ctx(FunnelStage::Sdr);
        context.hints.push("As duas últimas respostas foram idênticas.".to_string());
        let messages = builder.build(&context, &[], "oi");
        assert!(messages[0].content.contains("ATENÇÃO: As duas últimas"));
    }

    #[test]
    fn gamification_block_present_when_available() {
        let builder = PromptBuilder::new(6);
        let mut context = ctx(FunnelStage::Partner);
        let mut summary = GamificationSummary::empty(context.profile.id);
        summary.total_points = 1250;
        summary.level = 13;
        summary.current_streak = 9;
        context.gamification = Some(summary);
        let messages = builder.build(&context, &[], "oi");
        assert!(messages[0].content.contains("1250 XP"));
        assert!(messages[0].content.contains("nível 13"));
    }
}
