//! Reply-driven stage transitions
//!
//! The assistant's own replies carry the transition markers: when the SDR
//! persona hands over to the specialist, or the seller confirms signup, the
//! phrasing is fixed by the stage prompts and detected here.

use coach_core::FunnelStage;

/// Stage the reply says the conversation moved to, if any
pub fn transition_from_reply(reply: &str, current: FunnelStage) -> Option<FunnelStage> {
    let normalized = reply.to_lowercase();

    match current {
        FunnelStage::Sdr => {
            if normalized.contains("vou te conectar com nosso especialista")
                || normalized.contains("specialist")
            {
                return Some(FunnelStage::Specialist);
            }
        }
        FunnelStage::Specialist => {
            if normalized.contains("testar gratuitamente")
                || normalized.contains("seller")
                || normalized.contains("planos foram gerados")
            {
                return Some(FunnelStage::Seller);
            }
        }
        FunnelStage::Seller => {
            if normalized.contains("bem-vindo ao vida smart coach")
                || normalized.contains("partner")
                || normalized.contains("cadastro confirmado")
            {
                return Some(FunnelStage::Partner);
            }
        }
        FunnelStage::Partner => {}
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdr_handover_phrase() {
        let reply = "Adorei te conhecer! Vou te conectar com nosso especialista agora.";
        assert_eq!(
            transition_from_reply(reply, FunnelStage::Sdr),
            Some(FunnelStage::Specialist)
        );
    }

    #[test]
    fn specialist_completion_phrases() {
        assert_eq!(
            transition_from_reply("Seus planos foram gerados!", FunnelStage::Specialist),
            Some(FunnelStage::Seller)
        );
        assert_eq!(
            transition_from_reply("Você pode testar gratuitamente", FunnelStage::Specialist),
            Some(FunnelStage::Seller)
        );
    }

    #[test]
    fn seller_confirmation_phrase() {
        assert_eq!(
            transition_from_reply(
                "Cadastro confirmado! Bem-vindo ao Vida Smart Coach!",
                FunnelStage::Seller
            ),
            Some(FunnelStage::Partner)
        );
    }

    #[test]
    fn indicators_only_count_for_their_stage() {
        // A seller phrase in an SDR reply does not skip stages
        assert_eq!(
            transition_from_reply("Bem-vindo ao Vida Smart Coach!", FunnelStage::Sdr),
            None
        );
        assert_eq!(
            transition_from_reply("qualquer coisa", FunnelStage::Partner),
            None
        );
    }
}
