//! Health endpoints for the Session Controller.
//!
//! Provides Kubernetes-compatible health endpoints:
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (can we serve traffic?)
//! - `GET /health/store` - State store health (healthy vs degraded)
//!
//! A degraded store does NOT fail readiness: the controller keeps
//! serving on the in-process fallback. Degradation is reported on the
//! store endpoint so operators see it without the instance being pulled
//! out of rotation.
//!
//! Note: the `/metrics` endpoint is served separately via
//! `metrics-exporter-prometheus`.

use crate::store::{StateStore, StoreStatus};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health state for the Session Controller.
///
/// Tracks liveness and readiness for Kubernetes probes.
#[derive(Debug)]
pub struct HealthState {
    /// Whether the service is live (process running).
    /// Always true after startup initialization.
    live: AtomicBool,
    /// Whether the service is ready to serve traffic.
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    /// Mark the service as ready to serve traffic.
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the service as not ready (e.g., during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Check if the service is live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Shared state for the health router.
#[derive(Clone)]
struct HealthRouterState {
    health: Arc<HealthState>,
    store: StateStore,
}

/// Store health response body.
#[derive(Debug, Serialize)]
struct StoreHealthBody {
    status: &'static str,
    backend: &'static str,
}

/// Session listing response body (admin/debug surface).
#[derive(Debug, Serialize)]
struct SessionListBody {
    sessions: Vec<String>,
}

/// Create the health router.
///
/// # Endpoints
///
/// - `GET /health` - 200 if the process is running (liveness)
/// - `GET /ready` - 200 if ready to serve traffic, 503 otherwise
/// - `GET /health/store` - 200 with `{status, backend}` JSON
/// - `GET /health/sessions` - stored session ids (admin/debug surface)
pub fn health_router(health: Arc<HealthState>, store: StateStore) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .route("/health/store", get(store_handler))
        .route("/health/sessions", get(sessions_handler))
        .with_state(HealthRouterState { health, store })
}

/// Liveness probe handler.
async fn liveness_handler(State(state): State<HealthRouterState>) -> StatusCode {
    if state.health.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Readiness probe handler.
///
/// Readiness does not depend on the store backend: a degraded store
/// still serves sessions from the in-process fallback.
async fn readiness_handler(State(state): State<HealthRouterState>) -> StatusCode {
    if state.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Session listing handler: stored session ids by key prefix.
///
/// Debug surface for operators; a degraded store lists only what the
/// in-process fallback holds.
async fn sessions_handler(State(state): State<HealthRouterState>) -> Json<SessionListBody> {
    let keys = state
        .store
        .keys_by_prefix(crate::store::keys::SESSION_PREFIX)
        .await
        .unwrap_or_default();
    let sessions = keys
        .into_iter()
        .filter_map(|key| {
            key.strip_prefix(crate::store::keys::SESSION_PREFIX)
                .and_then(|rest| rest.strip_suffix(":state"))
                .map(ToString::to_string)
        })
        .collect();
    Json(SessionListBody { sessions })
}

/// Store health handler: reports healthy/degraded and the serving backend.
async fn store_handler(State(state): State<HealthRouterState>) -> Json<StoreHealthBody> {
    let health = state.store.health_check().await;
    Json(StoreHealthBody {
        status: match health.status {
            StoreStatus::Healthy => "healthy",
            StoreStatus::Degraded => "degraded",
        },
        backend: health.backend,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_health_state_default() {
        let state = HealthState::new();
        assert!(state.is_live(), "Should be live by default");
        assert!(!state.is_ready(), "Should not be ready by default");
    }

    #[test]
    fn test_health_state_set_ready() {
        let state = HealthState::new();

        state.set_ready();
        assert!(state.is_ready(), "Should be ready after set_ready()");

        state.set_not_ready();
        assert!(
            !state.is_ready(),
            "Should not be ready after set_not_ready()"
        );
    }

    #[tokio::test]
    async fn test_liveness_endpoint() {
        let router = health_router(Arc::new(HealthState::new()), StateStore::in_memory());

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_flips_with_state() {
        let health = Arc::new(HealthState::new());
        let router = health_router(Arc::clone(&health), StateStore::in_memory());

        let response = router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        health.set_ready();
        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sessions_endpoint_lists_stored_session_ids() {
        let store = StateStore::in_memory();
        store
            .put(
                "session:a1b2:state",
                "{}",
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();
        store
            .put(
                "session:a1b2:moderation",
                "{}",
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();

        let router = health_router(Arc::new(HealthState::new()), store);
        let response = router
            .oneshot(
                Request::get("/health/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["sessions"], serde_json::json!(["a1b2"]));
    }

    #[tokio::test]
    async fn test_store_endpoint_reports_degraded_fallback() {
        // An in-memory store has no networked backend: degraded, but the
        // endpoint answers 200 rather than erroring.
        let router = health_router(Arc::new(HealthState::new()), StateStore::in_memory());

        let response = router
            .oneshot(Request::get("/health/store").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "degraded");
        assert_eq!(parsed["backend"], "memory");
    }
}
