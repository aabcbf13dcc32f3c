//! Evolution webhook handler
//!
//! Inbound shape is the Evolution `messages.upsert` event. Non-text events
//! and the bot's own messages are acknowledged with `{"status":"ignored"}`
//! and touch nothing. Everything else flows through the engine, and the
//! reply (plus an optional proactive follow-up) goes back out through the
//! WhatsApp circuit breaker.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use coach_integrations::WebhookEvent;

use crate::error::ServerError;
use crate::metrics::{record_llm_fallback, record_send_fallback, record_webhook};
use crate::state::AppState;

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    let secret = state.webhook_secret();
    let presented = headers.get("apikey").and_then(|v| v.to_str().ok());
    if secret.is_empty() || presented != Some(secret.as_str()) {
        tracing::error!("unauthorized webhook access attempt");
        return Err(ServerError::Unauthorized);
    }

    let event: WebhookEvent = serde_json::from_value(body)
        .map_err(|e| ServerError::Validation(format!("malformed webhook body: {}", e)))?;

    if !event.is_processable() {
        record_webhook("ignored");
        return Ok(Json(json!({ "status": "ignored" })));
    }

    let raw_phone = event
        .raw_phone()
        .ok_or_else(|| ServerError::Validation("event carries no phone".to_string()))?
        .to_string();
    let text = event
        .data
        .as_ref()
        .and_then(|d| d.text())
        .ok_or_else(|| ServerError::Validation("event carries no text".to_string()))?
        .to_string();

    let reply = state
        .engine
        .handle_message(&coach_funnel::InboundMessage {
            raw_phone,
            text,
            event: event.event.clone(),
        })
        .await?;

    if reply.from_fallback {
        record_llm_fallback();
    }

    send_through_breaker(&state, &reply.number, &reply.reply).await?;
    if let Some(proactive) = &reply.proactive {
        send_through_breaker(&state, &reply.number, proactive).await?;
    }

    record_webhook(if reply.emergency { "emergency" } else { "processed" });

    Ok(Json(json!({
        "status": if reply.emergency { "emergency" } else { "processed" },
        "stage": reply.stage.as_str(),
        "from_fallback": reply.from_fallback,
        "proactive_sent": reply.proactive.is_some(),
    })))
}

/// Send with the Evolution breaker; an open circuit degrades to a dropped
/// send (logged and counted) rather than a failed webhook.
async fn send_through_breaker(
    state: &AppState,
    number: &str,
    text: &str,
) -> Result<(), ServerError> {
    let sender = state.sender.clone();
    let outcome = state
        .whatsapp_breaker
        .execute(
            || async move { sender.send_text(number, text).await },
            || async {
                Ok::<(), coach_integrations::IntegrationError>(())
            },
        )
        .await
        .map_err(|e| ServerError::Send(e.to_string()))?;

    if outcome.from_fallback {
        record_send_fallback();
        tracing::warn!(number = %number, "WhatsApp send degraded, message dropped");
    }
    Ok(())
}
