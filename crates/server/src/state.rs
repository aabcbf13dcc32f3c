//! Application state
//!
//! Shared across all handlers. The two circuit breakers live here, injected
//! at construction, so their lifetime is the process and their state is
//! explicit rather than ambient.

use std::sync::Arc;

use parking_lot::RwLock;

use coach_config::Settings;
use coach_core::CircuitBreaker;
use coach_funnel::{CoachEngine, PlanRegenerator};
use coach_integrations::MessageSender;
use coach_persistence::PersistenceLayer;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration behind a lock for hot-reload support
    pub config: Arc<RwLock<Settings>>,
    /// The per-message funnel controller
    pub engine: Arc<CoachEngine>,
    /// Outbound WhatsApp sends
    pub sender: Arc<dyn MessageSender>,
    /// Breaker around the Evolution send API
    pub whatsapp_breaker: Arc<CircuitBreaker>,
    /// Breaker around LLM completions (shared with the engine)
    pub llm_breaker: Arc<CircuitBreaker>,
    /// Direct regeneration access for the internal endpoint
    pub regenerator: Arc<PlanRegenerator>,
    /// Store access for the internal endpoints
    pub persistence: PersistenceLayer,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Settings,
        engine: Arc<CoachEngine>,
        sender: Arc<dyn MessageSender>,
        whatsapp_breaker: Arc<CircuitBreaker>,
        llm_breaker: Arc<CircuitBreaker>,
        regenerator: Arc<PlanRegenerator>,
        persistence: PersistenceLayer,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            engine,
            sender,
            whatsapp_breaker,
            llm_breaker,
            regenerator,
            persistence,
        }
    }

    pub fn webhook_secret(&self) -> String {
        self.config.read().server.webhook_secret.clone()
    }

    pub fn internal_secret(&self) -> String {
        self.config.read().server.internal_secret.clone()
    }
}
