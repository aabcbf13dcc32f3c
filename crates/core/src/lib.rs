//! Core traits and types for the coach backend
//!
//! This crate provides foundational types used across all other crates:
//! - Funnel stage enum and transition types
//! - The four life-area pillars
//! - User profile and gamification summary types
//! - Conversation turn types
//! - Circuit breaker for failure isolation around remote calls
//! - Error types

pub mod circuit;
pub mod conversation;
pub mod error;
pub mod gamification;
pub mod pillar;
pub mod profile;
pub mod stage;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitOutcome, CircuitState, CircuitStats};
pub use conversation::{Turn, TurnRole};
pub use error::{Error, Result};
pub use gamification::{level_for_points, GamificationSummary};
pub use pillar::Pillar;
pub use profile::{BillingStatus, UserProfile};
pub use stage::{FunnelStage, StageTransition, TransitionReason};
