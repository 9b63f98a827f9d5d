use std::sync::Arc;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::kv::KeyValue;
use crate::models::session::{
    truncate_history, ContextUpdate, Message, MessageMetadata, Role, Session, UserContextUpdate,
};

/// Session store with multi-tenant isolation on the shared key-value store.
///
/// Sessions are stored as JSON blobs under `session:{user_id}:{session_id}`
/// with a sliding TTL: every successful read or write extends the session's
/// life by the full window. Writes are last-writer-wins; callers must
/// read-modify-write under the per-user lock to avoid lost updates.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValue>,
    ttl_secs: u64,
    max_history: usize,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValue>, ttl_secs: u64, max_history: usize) -> Self {
        Self {
            kv,
            ttl_secs,
            max_history,
        }
    }

    fn key(user_id: &str, session_id: &str) -> String {
        format!("session:{user_id}:{session_id}")
    }

    fn user_pattern(user_id: &str) -> String {
        format!("session:{user_id}:*")
    }

    /// Creates a session for `user_id`, or returns the existing live one
    /// with its TTL refreshed. At most one live session exists per user.
    pub async fn create(&self, user_id: &str) -> Result<String> {
        if let Some(existing) = self.active_session_for_user(user_id).await? {
            tracing::info!("Reusing existing session for user {}: {}", user_id, existing);
            self.refresh_ttl(user_id, &existing).await;
            return Ok(existing);
        }

        let session = Session::new(user_id);
        let payload = sonic_rs::to_string(&session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {e}")))?;

        self.kv
            .set_ex(&Self::key(user_id, &session.session_id), &payload, self.ttl_secs)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create session for user {}: {}", user_id, e);
                AppError::SessionCreateFailure(user_id.to_string())
            })?;

        tracing::info!("Created session: {} for user: {}", session.session_id, user_id);
        Ok(session.session_id)
    }

    /// Retrieves a session, refreshing its TTL on a hit (sliding expiration).
    /// Returns `None` for a missing or expired key.
    pub async fn get(&self, session_id: &str, user_id: &str) -> Result<Option<Session>> {
        let key = Self::key(user_id, session_id);

        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };

        let session: Session = match sonic_rs::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding corrupt session {}: {}", session_id, e);
                return Ok(None);
            }
        };

        self.refresh_ttl(user_id, session_id).await;
        Ok(Some(session))
    }

    /// The most recent live session id for a user, discovered by key prefix.
    pub async fn active_session_for_user(&self, user_id: &str) -> Result<Option<String>> {
        let keys = self.kv.keys(&Self::user_pattern(user_id)).await?;

        for key in keys {
            let mut parts = key.splitn(3, ':');
            if let (Some(_), Some(_), Some(session_id)) = (parts.next(), parts.next(), parts.next())
            {
                return Ok(Some(session_id.to_string()));
            }
        }

        Ok(None)
    }

    /// Overwrites a session, refreshing `last_activity` and the TTL.
    /// Last-writer-wins: must only be called while holding the user's lock.
    pub async fn update(&self, session_id: &str, user_id: &str, mut session: Session) -> Result<()> {
        session.last_activity = Utc::now();

        let payload = sonic_rs::to_string(&session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {e}")))?;

        self.kv
            .set_ex(&Self::key(user_id, session_id), &payload, self.ttl_secs)
            .await?;
        Ok(())
    }

    /// Appends a message to the conversation history, enforcing the
    /// truncation policy: system messages are always retained, the oldest
    /// other messages are dropped once the history exceeds its bound.
    /// Returns `false` if the session does not exist.
    pub async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        role: Role,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<bool> {
        let Some(mut session) = self.get(session_id, user_id).await? else {
            tracing::error!("Session not found: {}", session_id);
            return Ok(false);
        };

        if let Some(tokens) = metadata.as_ref().and_then(|m| m.tokens_used) {
            session.metadata.total_tokens += tokens;
        }

        session
            .conversation_history
            .push(Message::new(role, content, metadata));

        if session.conversation_history.len() > self.max_history {
            session.conversation_history = truncate_history(
                std::mem::take(&mut session.conversation_history),
                self.max_history,
                Role::System,
            );
            tracing::debug!(
                "Truncated conversation history to {} messages",
                session.conversation_history.len()
            );
        }

        session.metadata.message_count = session.conversation_history.len();

        self.update(session_id, user_id, session).await?;
        Ok(true)
    }

    /// Merges updates into the session context; unspecified fields are left
    /// untouched. Returns `false` if the session does not exist.
    pub async fn update_context(
        &self,
        session_id: &str,
        user_id: &str,
        updates: ContextUpdate,
    ) -> Result<bool> {
        let Some(mut session) = self.get(session_id, user_id).await? else {
            return Ok(false);
        };

        if let Some(pending_action) = updates.pending_action {
            session.context.pending_action = pending_action;
        }
        if let Some(last_action) = updates.last_action {
            session.context.last_action = last_action;
        }
        if let Some(user_timezone) = updates.user_timezone {
            session.context.user_timezone = user_timezone;
        }

        self.update(session_id, user_id, session).await?;
        Ok(true)
    }

    /// Merges updates into the durable user context (bot name, user name,
    /// preferences). Returns `false` if the session does not exist.
    pub async fn update_user_context(
        &self,
        session_id: &str,
        user_id: &str,
        updates: UserContextUpdate,
    ) -> Result<bool> {
        let Some(mut session) = self.get(session_id, user_id).await? else {
            return Ok(false);
        };

        if let Some(bot_name) = updates.bot_name {
            session.user_context.bot_name = Some(bot_name);
        }
        if let Some(user_name) = updates.user_name {
            session.user_context.user_name = Some(user_name);
        }
        if let Some(preferences) = updates.preferences {
            session.user_context.preferences = Some(preferences);
        }
        if let Some(relationship) = updates.relationship {
            session.user_context.relationship = relationship;
        }

        tracing::info!("Updated user context for {}", user_id);

        self.update(session_id, user_id, session).await?;
        Ok(true)
    }

    /// The most recent `limit` history entries, oldest first.
    pub async fn conversation_history(
        &self,
        session_id: &str,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let Some(session) = self.get(session_id, user_id).await? else {
            return Ok(Vec::new());
        };

        let mut history = session.conversation_history;
        if let Some(limit) = limit {
            if history.len() > limit {
                history = history.split_off(history.len() - limit);
            }
        }
        Ok(history)
    }

    /// Deletes a session immediately. Idempotent: absence is not an error.
    pub async fn delete(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.kv.del(&Self::key(user_id, session_id)).await?;
        tracing::debug!("Session deleted: {} for user: {}", session_id, user_id);
        Ok(())
    }

    /// Counts live sessions across all users.
    pub async fn active_sessions_count(&self) -> Result<usize> {
        Ok(self.kv.keys("session:*").await?.len())
    }

    async fn refresh_ttl(&self, user_id: &str, session_id: &str) {
        let key = Self::key(user_id, session_id);
        if let Err(e) = self.kv.expire(&key, self.ttl_secs).await {
            tracing::debug!("Failed to refresh session TTL for {}: {}", session_id, e);
        }
    }
}
