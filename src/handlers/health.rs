use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

/// The response payload for the composite health check.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub gateway: String,
    pub redis: bool,
    pub active_sessions: usize,
}

/// Reports the health of the gateway, the store and the session population.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let gateway_ok = state.gateway.health_check().await;
    let redis_ok = state.kv.ping().await.is_ok();
    let active_sessions = state.sessions.active_sessions_count().await.unwrap_or(0);

    let all_ok = gateway_ok && redis_ok;

    Json(HealthResponse {
        status: if all_ok { "healthy" } else { "degraded" }.to_string(),
        gateway: if gateway_ok { "online" } else { "offline" }.to_string(),
        redis: redis_ok,
        active_sessions,
    })
}
