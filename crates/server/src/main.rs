//! Coach server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use coach_config::{load_settings, Settings};
use coach_core::{CircuitBreaker, CircuitBreakerConfig};
use coach_funnel::{CoachEngine, EngineConfig, PlanRegenerator, ProactiveEngine};
use coach_integrations::{EvolutionClient, HttpPlanService};
use coach_llm::{OpenAIBackend, OpenAIConfig};
use coach_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("COACH_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Configuration errors are fatal outside development
            eprintln!("Failed to load configuration: {}", e);
            if env.as_deref() == Some("production") || env.as_deref() == Some("staging") {
                std::process::exit(1);
            }
            eprintln!("Falling back to defaults (development only)");
            Settings::default()
        }
    };

    init_tracing(&config);
    tracing::info!("Starting coach server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_env = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let _metrics_handle = init_metrics();
    tracing::info!("Initialized Prometheus metrics at /metrics");

    // ScyllaDB when enabled, in-memory otherwise (dev/test only: state dies
    // with the process)
    let persistence = if config.persistence.enabled {
        let scylla_config = coach_persistence::ScyllaConfig {
            hosts: config.persistence.scylla_hosts.clone(),
            keyspace: config.persistence.keyspace.clone(),
            replication_factor: config.persistence.replication_factor,
        };
        match coach_persistence::init(scylla_config).await {
            Ok(layer) => {
                tracing::info!(
                    hosts = ?config.persistence.scylla_hosts,
                    keyspace = %config.persistence.keyspace,
                    "ScyllaDB persistence initialized"
                );
                layer
            }
            Err(e) => {
                tracing::error!("Failed to initialize ScyllaDB: {}. Falling back to in-memory.", e);
                coach_persistence::PersistenceLayer::in_memory()
            }
        }
    } else {
        tracing::info!("Persistence disabled, using in-memory stores");
        coach_persistence::PersistenceLayer::in_memory()
    };

    // External collaborators behind their trait seams
    let llm = Arc::new(OpenAIBackend::new(OpenAIConfig::from_settings(&config.llm))?);
    let sender = Arc::new(EvolutionClient::new(&config.whatsapp)?);
    let plan_service = Arc::new(HttpPlanService::new(
        &config.plan_service,
        Some(config.server.internal_secret.clone()),
    )?);

    // One breaker per remote dependency, process lifetime, explicit wiring
    let llm_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        threshold: config.llm.breaker_threshold,
        open_timeout: Duration::from_millis(config.llm.breaker_timeout_ms),
        name: "coach-llm".to_string(),
    }));
    let whatsapp_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        threshold: config.whatsapp.breaker_threshold,
        open_timeout: Duration::from_millis(config.whatsapp.breaker_timeout_ms),
        name: "evolution-api".to_string(),
    }));

    let regenerator = Arc::new(PlanRegenerator::new(
        persistence.plans.clone(),
        persistence.feedback.clone(),
        plan_service,
    ));
    let proactive = ProactiveEngine::new(
        persistence.gamification.clone(),
        persistence.conversations.clone(),
        persistence.feedback.clone(),
        persistence.proactive.clone(),
        config.proactive.cooldown_hours,
    );

    let engine = Arc::new(CoachEngine::new(
        persistence.clone(),
        llm,
        llm_breaker.clone(),
        regenerator.as_ref().clone(),
        proactive,
        EngineConfig {
            funnel: config.funnel.clone(),
            proactive_enabled: config.proactive.enabled,
        },
    ));

    let port = config.server.port;
    let state = AppState::new(
        config,
        engine,
        sender,
        whatsapp_breaker,
        llm_breaker,
        regenerator,
        persistence,
    );

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("coach={},coach_server={},tower_http=info", level, level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
