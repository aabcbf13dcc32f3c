//! Emergency protocol
//!
//! Inbound messages are screened for crisis language before anything else.
//! A match short-circuits the funnel entirely: the CVV support message is
//! sent, an alert is recorded, and no LLM call happens.

/// Crisis phrases, matched case-insensitively as substrings
const EMERGENCY_KEYWORDS: &[&str] = &[
    "me matar",
    "me suicidar",
    "quero morrer",
    "quero desaparecer",
    "não aguento mais",
    "nao aguento mais",
    "não vejo saída",
    "nao vejo saida",
    "me cortar",
    "automutilação",
    "automutilacao",
    "suicídio",
    "suicidio",
    "desistir de tudo",
];

/// Fixed support response pointing to CVV (188)
pub const EMERGENCY_RESPONSE: &str =
    "Percebi que você pode estar passando por um momento muito difícil. Por favor, saiba que \
     você não está só e que ajuda está disponível. O Centro de Valorização da Vida (CVV) \
     oferece apoio emocional gratuito e sigiloso, 24 horas por dia. Ligue para 188 ou acesse \
     cvv.org.br. Sua vida é muito importante.";

/// Whether the message trips the emergency protocol
pub fn is_emergency(message: &str) -> bool {
    let lower = message.to_lowercase();
    EMERGENCY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crisis_phrases_match() {
        assert!(is_emergency("Não aguento mais, quero desaparecer"));
        assert!(is_emergency("estou pensando em ME MATAR"));
        assert!(is_emergency("vou desistir de tudo"));
    }

    #[test]
    fn ordinary_venting_does_not_match() {
        assert!(!is_emergency("estou cansado do treino"));
        assert!(!is_emergency("que dia difícil"));
    }
}
