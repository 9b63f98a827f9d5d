use crate::error::{AppError, Result};
use crate::models::session::{ContextUpdate, MessageMetadata, Role};
use crate::services::gateway::{GatewayClient, GatewayRequest};
use crate::services::locks::LockManager;
use crate::services::rate_limit::RateLimiter;
use crate::services::sessions::SessionStore;

/// One inbound message from the messaging platform.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub user_id: String,
    pub message: String,
    pub credentials: Option<sonic_rs::Value>,
    pub timezone: Option<String>,
}

/// The result of a fully processed inbound message.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub session_id: String,
    pub response: String,
    pub action_performed: Option<String>,
    pub details: Option<sonic_rs::Value>,
}

/// Composes the quota check, per-user lock, session store and gateway client
/// to process one inbound message end-to-end.
///
/// Per user, the lock serializes processing: appends to the conversation
/// history never interleave. The lock is released on every exit path before
/// control returns to the caller.
#[derive(Clone)]
pub struct RequestOrchestrator {
    sessions: SessionStore,
    locks: LockManager,
    limiter: RateLimiter,
    gateway: GatewayClient,
    daily_limit: i64,
    lock_timeout_secs: u64,
}

impl RequestOrchestrator {
    pub fn new(
        sessions: SessionStore,
        locks: LockManager,
        limiter: RateLimiter,
        gateway: GatewayClient,
        daily_limit: i64,
        lock_timeout_secs: u64,
    ) -> Self {
        Self {
            sessions,
            locks,
            limiter,
            gateway,
            daily_limit,
            lock_timeout_secs,
        }
    }

    /// Processes one inbound message for a user.
    ///
    /// Flow: quota check, lock acquisition, get-or-create session, append the
    /// user message, gateway call with retries, append the assistant reply,
    /// merge the session context, release the lock.
    pub async fn process_message(&self, inbound: InboundMessage) -> Result<ExecuteOutcome> {
        let decision = self
            .limiter
            .check_and_increment(&inbound.user_id, self.daily_limit)
            .await;
        if !decision.allowed {
            tracing::warn!("Rate limit exceeded for user {}", inbound.user_id);
            return Err(AppError::RateLimitExceeded {
                reset_at: decision.reset_at,
            });
        }

        let lock = self
            .locks
            .acquire(&inbound.user_id, self.lock_timeout_secs)
            .await;
        if !lock.is_granted() {
            return Err(AppError::UserLocked);
        }

        // Exactly one fallible call between acquire and release, so the lock
        // is released on every exit path of the critical section.
        let result = self.process_locked(&inbound).await;
        self.locks.release(&inbound.user_id).await;
        result
    }

    async fn process_locked(&self, inbound: &InboundMessage) -> Result<ExecuteOutcome> {
        let session_id = self.sessions.create(&inbound.user_id).await?;
        let Some(session) = self.sessions.get(&session_id, &inbound.user_id).await? else {
            return Err(AppError::SessionCreateFailure(inbound.user_id.clone()));
        };

        self.sessions
            .append_message(&session_id, &inbound.user_id, Role::User, &inbound.message, None)
            .await?;

        let request = GatewayRequest {
            session_id: session_id.clone(),
            message: inbound.message.clone(),
            credentials: inbound
                .credentials
                .clone()
                .unwrap_or_else(|| sonic_rs::json!({})),
            history: session.conversation_history,
            user_id: Some(inbound.user_id.clone()),
            timezone: inbound.timezone.clone(),
        };

        let response = self.gateway.send_message(&request).await?;

        let assistant_message = response
            .response
            .clone()
            .unwrap_or_else(|| "Action completed".to_string());

        let metadata = if response.action_type.is_some() || response.tokens_used.is_some() {
            Some(MessageMetadata {
                action_type: response.action_type.clone(),
                tokens_used: response.tokens_used,
            })
        } else {
            None
        };

        self.sessions
            .append_message(
                &session_id,
                &inbound.user_id,
                Role::Assistant,
                &assistant_message,
                metadata,
            )
            .await?;

        self.sessions
            .update_context(
                &session_id,
                &inbound.user_id,
                ContextUpdate {
                    last_action: Some(response.action_type.clone()),
                    pending_action: Some(None),
                    user_timezone: inbound.timezone.clone(),
                },
            )
            .await?;

        Ok(ExecuteOutcome {
            session_id,
            response: assistant_message,
            action_performed: response.action_type,
            details: response.details,
        })
    }
}
