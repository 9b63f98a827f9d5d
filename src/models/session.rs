use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Free-form annotations attached to a single message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// The action the gateway performed when producing this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    /// Tokens the gateway spent on this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

/// One entry in a session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>, metadata: Option<MessageMetadata>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Per-request conversational context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// An action awaiting user confirmation, if any.
    pub pending_action: Option<String>,
    /// The last action the gateway executed for this session.
    pub last_action: Option<String>,
    /// The user's timezone, defaulting to UTC until the platform tells us.
    pub user_timezone: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            pending_action: None,
            last_action: None,
            user_timezone: "UTC".to_string(),
        }
    }
}

/// Durable per-user personalization, persisted across requests within the
/// session TTL but not guaranteed beyond it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    /// Custom name the user gave the bot.
    pub bot_name: Option<String>,
    /// The user's real name.
    pub user_name: Option<String>,
    /// User-specific preferences/notes.
    pub preferences: Option<String>,
    /// Relationship type, defaults to "assistant".
    pub relationship: String,
}

impl Default for UserContext {
    fn default() -> Self {
        Self {
            bot_name: None,
            user_name: None,
            preferences: None,
            relationship: "assistant".to_string(),
        }
    }
}

/// Derived counters maintained alongside the history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub message_count: usize,
    pub total_tokens: u64,
}

/// One user's ongoing conversation window.
///
/// At most one live session exists per `user_id` at any time; the session
/// expires from the store after the configured TTL unless touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session token, generated at creation.
    pub session_id: String,
    /// The external identity this session belongs to.
    pub user_id: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the last write; advances on every update.
    pub last_activity: DateTime<Utc>,
    /// Ordered conversation history, bounded by the store's truncation policy.
    pub conversation_history: Vec<Message>,
    /// Per-request conversational context.
    pub context: SessionContext,
    /// Durable per-user personalization.
    #[serde(default)]
    pub user_context: UserContext,
    /// Derived counters.
    pub metadata: SessionMetadata,
}

impl Session {
    /// Initializes a fresh session for `user_id`.
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: new_session_id(),
            user_id: user_id.to_string(),
            created_at: now,
            last_activity: now,
            conversation_history: Vec::new(),
            context: SessionContext::default(),
            user_context: UserContext::default(),
            metadata: SessionMetadata::default(),
        }
    }
}

/// Allocates an opaque session token.
pub fn new_session_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("sess_{}", &hex[..12])
}

/// A merge patch for [`SessionContext`]. Outer `None` leaves the field
/// untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    pub pending_action: Option<Option<String>>,
    pub last_action: Option<Option<String>>,
    pub user_timezone: Option<String>,
}

/// A merge patch for [`UserContext`]. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserContextUpdate {
    pub bot_name: Option<String>,
    pub user_name: Option<String>,
    pub preferences: Option<String>,
    pub relationship: Option<String>,
}

/// Bounds `history` to at most `max` entries.
///
/// Every `preserved`-role message is retained unconditionally; the oldest
/// other messages are discarded until the bound holds, keeping the original
/// interleaved order. If preserved messages alone exceed `max`, all of them
/// survive and the result exceeds `max` (a standing system preamble is never
/// evicted).
pub fn truncate_history(history: Vec<Message>, max: usize, preserved: Role) -> Vec<Message> {
    if history.len() <= max {
        return history;
    }

    let preserved_count = history.iter().filter(|m| m.role == preserved).count();
    let other_count = history.len() - preserved_count;
    let keep_others = max.saturating_sub(preserved_count).min(other_count);
    let mut drop_others = other_count - keep_others;

    history
        .into_iter()
        .filter(|m| {
            if m.role == preserved {
                return true;
            }
            if drop_others > 0 {
                drop_others -= 1;
                false
            } else {
                true
            }
        })
        .collect()
}
