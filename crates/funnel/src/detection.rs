//! Keyword-signal stage detection
//!
//! Counts Portuguese phrase signals per stage in the latest user message and
//! picks a stage once two or more fire, with partner > seller > specialist >
//! sdr precedence. Deliberately naive string matching: explainability over
//! accuracy. Everything regex-shaped stays inside this module so a semantic
//! classifier can replace it without touching the state machine.

use once_cell::sync::Lazy;
use regex::Regex;

use coach_core::{FunnelStage, Turn};

static INTEREST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(quero|preciso|ajuda|ajudar|melhorar|arrumar|corrigir)").expect("valid regex")
});

static PLAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(plano|treino|dieta|rotina|cardapio|cardápio)").expect("valid regex"));

static ADJUSTMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(ajustar|ajuste|mudar|alterar|regenerar|refazer|recriar)\b").expect("valid regex")
});

static NEW_PLAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnovo\s+plano\b").expect("valid regex"));

static PAIN_LEVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)/10|(\d+) de 10|nível (\d+)").expect("valid regex"));

/// Signal counts per stage, kept for logging and confidence
#[derive(Debug, Clone, Default)]
pub struct SignalSnapshot {
    pub partner: usize,
    pub seller: usize,
    pub specialist: usize,
    pub sdr: usize,
    pub plan_adjustment_intent: bool,
    pub interest_keywords: bool,
    pub plan_keywords: bool,
}

/// Detection outcome
#[derive(Debug, Clone)]
pub struct StageDetection {
    pub stage: Option<FunnelStage>,
    pub confidence: f32,
    pub signals: SignalSnapshot,
}

/// Detect the stage the message sounds like, independent of the stored stage
pub fn detect_stage(message: &str, history: &[Turn]) -> StageDetection {
    let msg = message.to_lowercase();

    let partner_signals = [
        msg.contains("check-in"),
        msg.contains("como foi"),
        msg.contains("consegui"),
        msg.contains("fiz o treino"),
        msg.contains("bebi água"),
        msg.contains("segui o plano"),
        msg.contains("como estou"),
        history.len() >= 5,
    ];

    let seller_signals = [
        msg.contains("quero testar"),
        msg.contains("teste grátis"),
        msg.contains("como funciona"),
        msg.contains("quanto custa"),
        msg.contains("preço"),
        msg.contains("assinar"),
        msg.contains("começar"),
        msg.contains("cadastro"),
        msg.contains("quero começar"),
    ];

    let specialist_signals = [
        msg.contains("preciso de ajuda"),
        msg.contains("estou com dificuldade"),
        msg.contains("não consigo"),
        msg.contains("problema com"),
        msg.contains("tenho lutado"),
        msg.contains("ansiedade"),
        msg.contains("depressão"),
        msg.contains("peso"),
        msg.contains("alimentação"),
        msg.contains("físico"),
        msg.contains("emocional"),
        extract_pain_level(message) >= 7,
    ];

    let sdr_signals = [
        msg.contains("oi"),
        msg.contains("olá"),
        msg.contains("bom dia"),
        msg.contains("boa tarde"),
        msg.contains("boa noite"),
        msg.contains("o que é"),
        msg.contains("me fale sobre"),
        message.len() < 50 && !msg.contains("não"),
    ];

    let interest_keywords = INTEREST_RE.is_match(&msg);
    let plan_keywords = PLAN_RE.is_match(&msg);
    let plan_adjustment_intent =
        (ADJUSTMENT_RE.is_match(&msg) && plan_keywords) || NEW_PLAN_RE.is_match(&msg);

    let signals = SignalSnapshot {
        partner: partner_signals.iter().filter(|s| **s).count(),
        seller: seller_signals.iter().filter(|s| **s).count(),
        specialist: specialist_signals.iter().filter(|s| **s).count(),
        sdr: sdr_signals.iter().filter(|s| **s).count(),
        plan_adjustment_intent,
        interest_keywords,
        plan_keywords,
    };

    let mut stage = if signals.partner >= 2 {
        Some(FunnelStage::Partner)
    } else if signals.seller >= 2 {
        Some(FunnelStage::Seller)
    } else if signals.specialist >= 2 {
        Some(FunnelStage::Specialist)
    } else if signals.sdr >= 2 {
        Some(FunnelStage::Sdr)
    } else {
        None
    };

    // Fallback heuristic: plan-adjustment talk is specialist territory
    if stage.is_none()
        && (plan_adjustment_intent || (signals.specialist >= 1 && interest_keywords && plan_keywords))
    {
        stage = Some(FunnelStage::Specialist);
    }

    let confidence = compute_confidence(stage, &signals);

    tracing::debug!(
        stage = ?stage,
        confidence,
        partner = signals.partner,
        seller = signals.seller,
        specialist = signals.specialist,
        sdr = signals.sdr,
        "stage detection"
    );

    StageDetection {
        stage,
        confidence,
        signals,
    }
}

fn compute_confidence(stage: Option<FunnelStage>, signals: &SignalSnapshot) -> f32 {
    let Some(stage) = stage else {
        return 0.0;
    };
    let strength = match stage {
        FunnelStage::Partner => signals.partner,
        FunnelStage::Seller => signals.seller,
        FunnelStage::Specialist => signals.specialist,
        FunnelStage::Sdr => signals.sdr,
    };
    if strength == 0 {
        // Heuristic-only pick (adjustment intent with no direct signals)
        return if signals.plan_adjustment_intent { 0.6 } else { 0.4 };
    }
    let normalized = (strength as f32 / 3.0).min(1.0);
    let bonus = if signals.plan_adjustment_intent && stage == FunnelStage::Specialist {
        0.2
    } else {
        0.0
    };
    (normalized + bonus).min(1.0)
}

/// Extract a 0-10 pain intensity from free text.
///
/// Explicit `7/10`, `7 de 10` or `nível 7` wins; otherwise intensity words
/// give a coarse estimate and the default is a neutral 5.
pub fn extract_pain_level(message: &str) -> u8 {
    if let Some(caps) = PAIN_LEVEL_RE.captures(message) {
        let digits = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str());
        if let Some(level) = digits.and_then(|d| d.parse::<u8>().ok()) {
            return level.min(10);
        }
    }

    let lower = message.to_lowercase();
    if lower.contains("muito") || lower.contains("demais") {
        8
    } else if lower.contains("bastante") || lower.contains("bem") {
        7
    } else if lower.contains("um pouco") || lower.contains("às vezes") {
        4
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_reads_as_sdr() {
        let detection = detect_stage("oi, bom dia!", &[]);
        assert_eq!(detection.stage, Some(FunnelStage::Sdr));
        assert!(detection.confidence > 0.0);
    }

    #[test]
    fn pain_talk_reads_as_specialist() {
        let detection = detect_stage("preciso de ajuda, estou com dificuldade com meu peso", &[]);
        assert_eq!(detection.stage, Some(FunnelStage::Specialist));
    }

    #[test]
    fn pricing_talk_reads_as_seller() {
        let detection = detect_stage("quanto custa? quero testar", &[]);
        assert_eq!(detection.stage, Some(FunnelStage::Seller));
    }

    #[test]
    fn checkin_talk_reads_as_partner() {
        let detection = detect_stage("fiz o treino e bebi água hoje", &[]);
        assert_eq!(detection.stage, Some(FunnelStage::Partner));
    }

    #[test]
    fn plan_adjustment_falls_back_to_specialist() {
        let detection = detect_stage("quero regenerar meu plano de treino urgentemente porque machuquei o joelho", &[]);
        assert_eq!(detection.stage, Some(FunnelStage::Specialist));
        assert!(detection.signals.plan_adjustment_intent);
    }

    #[test]
    fn gibberish_detects_nothing() {
        let detection = detect_stage("xyzzy qwerty asdf jkl semordnilap retupmoc", &[]);
        assert_eq!(detection.stage, None);
        assert_eq!(detection.confidence, 0.0);
    }

    #[test]
    fn pain_level_extraction() {
        assert_eq!(extract_pain_level("minha dor é 8/10"), 8);
        assert_eq!(extract_pain_level("uns 9 de 10"), 9);
        assert_eq!(extract_pain_level("nível 3 eu diria"), 3);
        assert_eq!(extract_pain_level("dói muito"), 8);
        assert_eq!(extract_pain_level("um pouco incomodado"), 4);
        assert_eq!(extract_pain_level("normal"), 5);
    }
}
