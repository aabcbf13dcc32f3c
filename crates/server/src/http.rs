//! HTTP endpoints
//!
//! REST surface: the Evolution webhook, internal function-to-function
//! endpoints (chat, plan regeneration), health checks and metrics.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use coach_funnel::InboundMessage;

use crate::error::ServerError;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::webhook::handle_webhook;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    drop(config);

    Router::new()
        // Evolution webhook
        .route("/webhook/whatsapp", post(handle_webhook))
        // Internal function-to-function endpoints
        .route("/api/chat", post(internal_chat))
        .route("/api/plans/regenerate", post(regenerate_plans))
        .route("/api/users/:user_id/reset", post(reset_user))
        // Operational endpoints
        .route("/api/breakers", get(breaker_stats))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build the CORS layer from configured origins; empty defaults to localhost
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        tracing::info!("No CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Shared secret check for internal endpoints
fn check_internal_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ServerError> {
    let secret = state.internal_secret();
    if secret.is_empty() {
        return Err(ServerError::Unauthorized);
    }

    let from_header = headers
        .get("x-internal-secret")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == secret)
        .unwrap_or(false);
    let from_bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v == secret)
        .unwrap_or(false);

    if from_header || from_bearer {
        Ok(())
    } else {
        Err(ServerError::Unauthorized)
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    phone: Option<String>,
    message: Option<String>,
}

/// Internal chat endpoint: same engine path as the webhook, minus the send
async fn internal_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ServerError> {
    check_internal_auth(&state, &headers)?;

    let phone = request
        .phone
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ServerError::Validation("phone is required".to_string()))?;
    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ServerError::Validation("message is required".to_string()))?;

    let reply = state
        .engine
        .handle_message(&InboundMessage {
            raw_phone: phone,
            text: message,
            event: "internal.chat".to_string(),
        })
        .await?;

    Ok(Json(json!({
        "reply": reply.reply,
        "stage": reply.stage.as_str(),
        "from_fallback": reply.from_fallback,
        "proactive": reply.proactive,
    })))
}

#[derive(Debug, Deserialize)]
struct RegenerateRequest {
    user_id: Option<Uuid>,
    plan_type: Option<Value>,
    overrides: Option<Value>,
    summary: Option<String>,
}

/// Internal plan-regeneration endpoint
async fn regenerate_plans(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<Value>, ServerError> {
    check_internal_auth(&state, &headers)?;

    let user_id = request
        .user_id
        .ok_or_else(|| ServerError::Validation("user_id is required".to_string()))?;

    let profile = state
        .persistence
        .profiles
        .get(user_id)
        .await
        .map_err(|e| ServerError::Engine(e.to_string()))?
        .ok_or_else(|| ServerError::Validation(format!("unknown user {}", user_id)))?;

    let snapshot = serde_json::to_value(&profile).unwrap_or(json!({}));
    let action = coach_llm::AutomationAction {
        action_type: "regenerate_plan".to_string(),
        plan_type: request.plan_type,
        overrides: request.overrides,
        summary: request.summary,
    };

    let outcome = state.regenerator.regenerate(user_id, &snapshot, &action).await?;

    Ok(Json(json!({
        "success": outcome.success,
        "regenerated": outcome.regenerated.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        "failed": outcome.failed.map(|p| p.as_str()),
        "message": outcome.message,
    })))
}

/// Operational reset: the only backward path in the funnel, sends the user
/// back to SDR
async fn reset_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Path(user_id): axum::extract::Path<Uuid>,
) -> Result<Json<Value>, ServerError> {
    check_internal_auth(&state, &headers)?;

    state
        .persistence
        .stages
        .reset(user_id)
        .await
        .map_err(|e| ServerError::Engine(e.to_string()))?;

    tracing::info!(user_id = %user_id, "user funnel reset to sdr");
    Ok(Json(json!({ "status": "reset", "stage": "sdr" })))
}

/// Circuit breaker introspection
async fn breaker_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "llm": state.llm_breaker.stats(),
        "whatsapp": state.whatsapp_breaker.stats(),
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "distributed_persistence": state.persistence.is_distributed(),
    }))
}
