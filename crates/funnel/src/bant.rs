//! BANT qualification scoring
//!
//! Keyword-level detection of the four qualification dimensions in the
//! user's messages during the SDR stage. Signals accumulate across the
//! conversation in the stage metadata; the score is 25 points per satisfied
//! dimension.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static BUDGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(quanto custa|preço|preco|valor|investir|caro|barato|mensalidade|pagar)")
        .expect("valid regex")
});

static AUTHORITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(eu decido|eu mesmo|eu mesma|minha decisão|minha decisao|posso decidir|sou eu quem)")
        .expect("valid regex")
});

static NEED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(preciso|necessito|quero muito|meu problema|minha dor|dificuldade|sofro)")
        .expect("valid regex")
});

static TIMELINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(hoje|amanhã|amanha|essa semana|este mês|este mes|agora|urgente|quanto antes|já quero|ja quero)")
        .expect("valid regex")
});

/// Which qualification dimensions have been observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BantSignals {
    pub budget: bool,
    pub authority: bool,
    pub need: bool,
    pub timeline: bool,
}

impl BantSignals {
    /// Detect dimensions present in a single message
    pub fn detect(message: &str) -> Self {
        Self {
            budget: BUDGET_RE.is_match(message),
            authority: AUTHORITY_RE.is_match(message),
            need: NEED_RE.is_match(message),
            timeline: TIMELINE_RE.is_match(message),
        }
    }

    /// Accumulate: once a dimension is seen it stays satisfied
    pub fn merge(self, other: BantSignals) -> Self {
        Self {
            budget: self.budget || other.budget,
            authority: self.authority || other.authority,
            need: self.need || other.need,
            timeline: self.timeline || other.timeline,
        }
    }

    pub fn score(&self) -> BantScore {
        let per = coach_config::constants::bant::POINTS_PER_DIMENSION as i32;
        let count = [self.budget, self.authority, self.need, self.timeline]
            .iter()
            .filter(|d| **d)
            .count() as i32;
        BantScore(per * count)
    }
}

/// 0-100 qualification score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BantScore(pub i32);

impl BantScore {
    /// Qualified enough to leave the SDR stage on score alone
    pub fn is_qualified(&self) -> bool {
        self.0 >= coach_config::constants::bant::QUALIFIED_SCORE as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dimensions_independently() {
        let signals = BantSignals::detect("quanto custa o plano?");
        assert!(signals.budget);
        assert!(!signals.authority);

        let signals = BantSignals::detect("preciso resolver minha dor no joelho agora");
        assert!(signals.need);
        assert!(signals.timeline);
    }

    #[test]
    fn merge_is_sticky() {
        let first = BantSignals::detect("quanto custa?");
        let second = BantSignals::detect("eu decido, quero começar essa semana");
        let merged = first.merge(second);

        assert!(merged.budget);
        assert!(merged.authority);
        assert!(merged.timeline);
        assert!(!merged.need);
        assert_eq!(merged.score(), BantScore(75));
        assert!(merged.score().is_qualified());
    }

    #[test]
    fn two_dimensions_qualify() {
        let signals = BantSignals {
            budget: true,
            need: true,
            ..Default::default()
        };
        assert_eq!(signals.score(), BantScore(50));
        assert!(signals.score().is_qualified());

        let weak = BantSignals {
            need: true,
            ..Default::default()
        };
        assert!(!weak.score().is_qualified());
    }
}
