//! Prometheus metrics

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder; idempotent
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Render the current metric snapshot for the /metrics endpoint
pub async fn metrics_handler() -> String {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}

pub fn record_webhook(outcome: &'static str) {
    metrics::counter!("coach_webhook_events_total", "outcome" => outcome).increment(1);
}

pub fn record_llm_fallback() {
    metrics::counter!("coach_llm_fallbacks_total").increment(1);
}

pub fn record_send_fallback() {
    metrics::counter!("coach_whatsapp_send_fallbacks_total").increment(1);
}
