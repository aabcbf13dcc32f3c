//! Centralized defaults for the coach backend
//!
//! Single source of truth for thresholds and endpoints that would otherwise
//! end up duplicated across crates.

/// Anti-loop progression thresholds
pub mod progression {
    /// Minutes without recorded progress before advancement is forced
    pub const STAGNATION_TIMEOUT_SECS: u64 = 5 * 60;

    /// How many trailing identical questions count as repetition
    pub const REPEAT_WINDOW: usize = 3;

    /// Fraction of the four pillars that must be covered before the
    /// specialist stage is considered complete
    pub const TOPIC_COVERAGE_THRESHOLD: f32 = 0.75;

    /// Conversation turns fed back into the prompt window
    pub const HISTORY_WINDOW: usize = 6;
}

/// Circuit breaker defaults
pub mod breaker {
    /// Consecutive failures before a circuit opens
    pub const THRESHOLD: u32 = 5;

    /// Milliseconds a circuit stays open before the recovery probe
    pub const OPEN_TIMEOUT_MS: u64 = 30_000;
}

/// BANT qualification
pub mod bant {
    /// Points per satisfied BANT dimension (4 dimensions, 100 total)
    pub const POINTS_PER_DIMENSION: u8 = 25;

    /// Minimum score to leave the SDR stage on qualification alone
    pub const QUALIFIED_SCORE: u8 = 50;
}

/// Proactive messaging
pub mod proactive {
    /// Default per-user-per-type cooldown
    pub const COOLDOWN_HOURS: i64 = 24;

    /// Local hour (São Paulo) after which the missed-check-in nudge may fire
    pub const CHECKIN_NUDGE_HOUR: u32 = 20;

    /// Streak length that makes a streak worth protecting
    pub const STREAK_AT_RISK_MIN: i64 = 7;

    /// XP multiples celebrated as milestones
    pub const XP_MILESTONE_STEP: i64 = 1000;

    /// XP balance that triggers the reward suggestion
    pub const XP_REWARD_THRESHOLD: i64 = 5000;
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// OpenAI-compatible chat completion API
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";

    /// Evolution WhatsApp API
    pub const EVOLUTION_DEFAULT: &str = "http://localhost:8080";

    /// Internal plan-generation service
    pub const PLAN_SERVICE_DEFAULT: &str = "http://localhost:9000/functions/v1/generate-plan";
}

/// LLM defaults
pub mod llm {
    pub const MODEL: &str = "gpt-4o-mini";
    pub const TEMPERATURE: f32 = 0.8;
    pub const MAX_TOKENS: usize = 800;
    pub const TIMEOUT_SECS: u64 = 30;
}
