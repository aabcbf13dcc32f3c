//! Coach Server
//!
//! HTTP surface for the funnel controller: the Evolution WhatsApp webhook,
//! internal chat and plan-regeneration endpoints, health checks and
//! Prometheus metrics.

pub mod error;
pub mod http;
pub mod metrics;
pub mod state;
pub mod webhook;

pub use error::ServerError;
pub use http::create_router;
pub use metrics::{init_metrics, record_llm_fallback, record_send_fallback, record_webhook};
pub use state::AppState;
