//! Sanctuary Session Controller
//!
//! Real-time coordination service for live audio sanctuary rooms.
//!
//! # Servers
//!
//! The Session Controller runs one HTTP server for health endpoints and
//! Prometheus metrics (default: 0.0.0.0:8081). Participant traffic
//! arrives through the connection layer, which drives the actor system
//! via [`session_controller::actors`].
//!
//! # State Management
//!
//! - Live state in Redis with per-key TTLs
//! - Transparent in-process fallback when Redis is unreachable, surfaced
//!   through `/health/store`
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Connect the state store (degraded fallback on failure)
//! 4. Build the classifier and voice-synthesis clients
//! 5. Build the broadcast router, moderation pipeline, escalation engine
//! 6. Spawn the session directory actor
//! 7. Start the health/metrics HTTP server
//! 8. Wait for shutdown signal, then drain gracefully

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use common::secret::ExposeSecret;
use session_controller::actors::directory::{DirectoryLimits, SessionDirectoryHandle};
use session_controller::actors::{CoordinatorMetrics, SessionDeps};
use session_controller::broadcast::BroadcastRouter;
use session_controller::config::Config;
use session_controller::escalation::EscalationEngine;
use session_controller::moderation::classifier::HttpClassifier;
use session_controller::moderation::rules::RuleSet;
use session_controller::moderation::ModerationPipeline;
use session_controller::observability::{health_router, init_metrics_recorder, HealthState};
use session_controller::store::StateStore;
use session_controller::voice::SynthesisClient;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grace period for draining sessions on shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Session Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        region = %config.region,
        sc_id = %config.sc_id,
        health_bind_address = %config.health_bind_address,
        classifier_url = %config.classifier_url,
        max_sessions = config.max_sessions,
        max_participants_per_session = config.max_participants_per_session,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder.
    // This must happen before any metrics are recorded.
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Connect the state store. Never fatal: Redis loss means degraded
    // in-process state, surfaced through /health/store.
    info!("Connecting to the state store...");
    let store = StateStore::connect(config.redis_url.expose_secret()).await;
    if store.is_degraded() {
        warn!("State store started degraded (in-process fallback)");
    } else {
        info!("State store connected");
    }

    // External provider clients
    let classifier = HttpClassifier::new(
        config.classifier_url.clone(),
        config.classifier_api_key.clone(),
        Duration::from_secs(config.classifier_timeout_seconds),
    )?;
    let synthesis = SynthesisClient::new(
        config.voice_api_url.clone(),
        config.voice_api_key.clone(),
    )?;
    if !synthesis.is_enabled() {
        info!("Voice synthesis disabled (no provider key); text delivery only");
    }

    // Coordination core
    let router = BroadcastRouter::new();
    let escalation = EscalationEngine::new(router.clone(), store.clone());
    let pipeline = ModerationPipeline::new(RuleSet::builtin(), Arc::new(classifier), store.clone());
    let metrics = CoordinatorMetrics::new();

    let deps = SessionDeps {
        store: store.clone(),
        pipeline: Arc::new(pipeline),
        escalation,
        router,
        synthesis: Arc::new(synthesis),
        metrics,
    };

    let directory = SessionDirectoryHandle::new(
        config.sc_id.clone(),
        DirectoryLimits {
            max_sessions: config.max_sessions as usize,
            max_participants_per_session: config.max_participants_per_session as usize,
        },
        deps,
    );
    info!("Session directory started");

    // Health + metrics HTTP server
    let app = Router::new()
        .merge(health_router(Arc::clone(&health_state), store.clone()))
        .route(
            "/metrics",
            get(move || {
                let handle = prometheus_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.health_bind_address)
        .await
        .map_err(|e| {
            error!(
                bind_address = %config.health_bind_address,
                error = %e,
                "Failed to bind health server"
            );
            e
        })?;
    info!(bind_address = %config.health_bind_address, "Health server listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Health server exited with error");
        }
    });

    health_state.set_ready();
    info!("Session Controller ready");

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received, draining sessions");

    health_state.set_not_ready();
    if let Err(e) = directory.shutdown(SHUTDOWN_DEADLINE).await {
        warn!(error = %e, "Directory shutdown reported an error");
    }

    server.abort();
    info!("Session Controller stopped");
    Ok(())
}

/// Wait for SIGTERM or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
