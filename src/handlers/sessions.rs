use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::session::{Message, UserContextUpdate},
    state::AppState,
    validation::execute::validate_user_id,
};

/// The response payload for session info.
#[derive(Serialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
}

/// The response payload for clearing a session.
#[derive(Serialize)]
pub struct ClearSessionResponse {
    pub cleared: bool,
    pub session_id: Option<String>,
}

/// The query parameters for conversation history.
#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// The response payload for conversation history.
#[derive(Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub total_messages: usize,
}

/// The response payload for user-context updates.
#[derive(Serialize)]
pub struct UserContextResponse {
    pub updated: bool,
}

/// Returns the active session info for a user.
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    validate_user_id(&user_id)?;

    let session_id = state
        .sessions
        .active_session_for_user(&user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let session = state
        .sessions
        .get(&session_id, &user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let response = SessionInfoResponse {
        session_id: session.session_id,
        user_id: session.user_id,
        created_at: session.created_at,
        last_activity: session.last_activity,
        message_count: session.metadata.message_count,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Clears a user's active session.
#[axum::debug_handler]
pub async fn clear_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    validate_user_id(&user_id)?;

    let Some(session_id) = state.sessions.active_session_for_user(&user_id).await? else {
        let response = ClearSessionResponse {
            cleared: false,
            session_id: None,
        };
        return Ok((StatusCode::OK, Json(response)).into_response());
    };

    state.sessions.delete(&session_id, &user_id).await?;
    tracing::info!("🧹 Session cleared for user: {}", user_id);

    let response = ClearSessionResponse {
        cleared: true,
        session_id: Some(session_id),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns a user's recent conversation history.
#[axum::debug_handler]
pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    validate_user_id(&user_id)?;

    let session_id = state
        .sessions
        .active_session_for_user(&user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let messages = state
        .sessions
        .conversation_history(&session_id, &user_id, Some(query.limit))
        .await?;

    let response = HistoryResponse {
        session_id,
        total_messages: messages.len(),
        messages,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Merges durable personalization into a user's active session.
#[axum::debug_handler]
pub async fn update_user_context(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(updates): Json<UserContextUpdate>,
) -> Result<impl IntoResponse> {
    validate_user_id(&user_id)?;

    let session_id = state
        .sessions
        .active_session_for_user(&user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let updated = state
        .sessions
        .update_user_context(&session_id, &user_id, updates)
        .await?;

    Ok((StatusCode::OK, Json(UserContextResponse { updated })).into_response())
}

/// Returns the user's quota status without consuming any of it.
#[axum::debug_handler]
pub async fn rate_limit_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    validate_user_id(&user_id)?;

    let status = state
        .limiter
        .status(&user_id, state.config.daily_message_limit)
        .await;

    Ok((StatusCode::OK, Json(status)).into_response())
}
