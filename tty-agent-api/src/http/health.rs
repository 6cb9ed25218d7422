//! Liveness/readiness/metrics endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(name))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(metrics))
}

#[derive(Debug, Serialize)]
struct NameResponse {
    name: &'static str,
    ok: bool,
}

async fn name() -> impl IntoResponse {
    Json(NameResponse {
        name: "sealos-tty-agent",
        ok: true,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Liveness: the process is up and serving HTTP. No upstream checks.
async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Readiness: 200 once `AppState::mark_ready` has been called (ticket-store
/// sweeper spawned, listener bound), 503 beforehand. This gateway keeps no
/// persistent state, so it has no database/cache dependency to probe beyond
/// its own startup sequence.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, Json(HealthResponse { status: "ready" }))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { status: "starting" }))
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.config.metrics.enabled {
        return (StatusCode::NOT_FOUND, String::new());
    }
    (StatusCode::OK, tty_agent_core::metrics::render())
}
