//! ScyllaDB persistence layer for the coach backend
//!
//! Provides persistent storage for:
//! - User profiles (with phone lookup)
//! - Funnel stage log
//! - Conversation memory (append-only)
//! - Raw WhatsApp message log
//! - Plans and plan feedback
//! - Gamification summary and activity facts
//! - Proactive messages (with cooldown check)
//! - Guard decision metrics
//!
//! Every store has a trait seam plus an in-memory implementation used for
//! tests and persistence-free development.

pub mod client;
pub mod error;
pub mod gamification;
pub mod memory;
pub mod messages;
pub mod metrics;
pub mod plans;
pub mod proactive;
pub mod profiles;
pub mod schema;
pub mod stages;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use gamification::{GamificationStore, InMemoryGamificationStore, ScyllaGamificationStore};
pub use memory::{
    ConversationStore, InMemoryConversationStore, InteractionRecord, ScyllaConversationStore,
};
pub use messages::{InMemoryMessageLog, MessageLog, ScyllaMessageLog, WhatsAppMessageRecord};
pub use metrics::{GuardMetricRecord, InMemoryMetricsStore, MetricsStore, ScyllaMetricsStore};
pub use plans::{
    FeedbackRecord, FeedbackStore, InMemoryFeedbackStore, InMemoryPlanStore, PlanRecord, PlanStore,
    ScyllaFeedbackStore, ScyllaPlanStore, AUTO_REGEN_RESPONSE,
};
pub use proactive::{
    InMemoryProactiveStore, ProactiveRecord, ProactiveStore, ScyllaProactiveStore,
};
pub use profiles::{InMemoryProfileStore, ProfileStore, ScyllaProfileStore};
pub use stages::{InMemoryStageStore, ScyllaStageStore, StageRecord, StageStore};

use std::sync::Arc;

/// Combined persistence layer with all stores behind their trait seams
#[derive(Clone)]
pub struct PersistenceLayer {
    pub profiles: Arc<dyn ProfileStore>,
    pub stages: Arc<dyn StageStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageLog>,
    pub plans: Arc<dyn PlanStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub gamification: Arc<dyn GamificationStore>,
    pub proactive: Arc<dyn ProactiveStore>,
    pub metrics: Arc<dyn MetricsStore>,
    distributed: bool,
}

impl PersistenceLayer {
    /// True when backed by ScyllaDB rather than process memory
    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    /// All stores in process memory; state dies with the process
    pub fn in_memory() -> Self {
        Self {
            profiles: Arc::new(InMemoryProfileStore::new()),
            stages: Arc::new(InMemoryStageStore::new()),
            conversations: Arc::new(InMemoryConversationStore::new()),
            messages: Arc::new(InMemoryMessageLog::new()),
            plans: Arc::new(InMemoryPlanStore::new()),
            feedback: Arc::new(InMemoryFeedbackStore::new()),
            gamification: Arc::new(InMemoryGamificationStore::new()),
            proactive: Arc::new(InMemoryProactiveStore::new()),
            metrics: Arc::new(InMemoryMetricsStore::new()),
            distributed: false,
        }
    }
}

/// Initialize the ScyllaDB persistence layer
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        profiles: Arc::new(ScyllaProfileStore::new(client.clone())),
        stages: Arc::new(ScyllaStageStore::new(client.clone())),
        conversations: Arc::new(ScyllaConversationStore::new(client.clone())),
        messages: Arc::new(ScyllaMessageLog::new(client.clone())),
        plans: Arc::new(ScyllaPlanStore::new(client.clone())),
        feedback: Arc::new(ScyllaFeedbackStore::new(client.clone())),
        gamification: Arc::new(ScyllaGamificationStore::new(client.clone())),
        proactive: Arc::new(ScyllaProactiveStore::new(client.clone())),
        metrics: Arc::new(ScyllaMetricsStore::new(client)),
        distributed: true,
    })
}
