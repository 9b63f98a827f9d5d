use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    services::orchestrator::InboundMessage,
    state::AppState,
    validation::execute::*,
};

/// The request payload for message execution.
#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub credentials: Option<sonic_rs::Value>,
}

/// The response payload for a processed message.
#[derive(Serialize)]
pub struct ExecuteResponse {
    pub session_id: String,
    pub response: String,
    pub action_performed: Option<String>,
    pub details: Option<sonic_rs::Value>,
}

/// Handles one inbound user message end-to-end.
#[axum::debug_handler]
pub async fn execute(
    State(state): State<AppState>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!("📨 Execute request for user: {}", payload.user_id);
    validate_user_id(&payload.user_id)?;
    validate_message(&payload.message)?;
    validate_timezone(payload.timezone.as_deref())?;

    let outcome = state
        .orchestrator
        .process_message(InboundMessage {
            user_id: payload.user_id,
            message: payload.message,
            credentials: payload.credentials,
            timezone: payload.timezone,
        })
        .await?;

    tracing::info!("✅ Action executed for session: {}", outcome.session_id);

    let response = ExecuteResponse {
        session_id: outcome.session_id,
        response: outcome.response,
        action_performed: outcome.action_performed,
        details: outcome.details,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
