//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::AppState;
use crate::verifier::StatsSnapshot;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the process running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    store: &'static str,
}

/// Readiness check (is the session store reachable?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    let store = state.verifier.store();

    match store.ping().await {
        Ok(()) => Ok(Json(ReadyResponse {
            status: "ready",
            store: store.name(),
        })),
        Err(e) => {
            tracing::warn!(backend = store.name(), error = %e, "Readiness check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    counters: StatsSnapshot,
    active_locks: usize,
    uptime_secs: u64,
}

/// Verification counters since start
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        counters: state.verifier.stats(),
        active_locks: state.verifier.active_locks(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
