use std::env;
use anyhow::{Context, Result};

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the downstream action gateway.
    pub gateway_url: String,
    /// Per-request timeout for gateway calls, in seconds.
    pub gateway_timeout_secs: u64,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// Session time-to-live, in seconds; refreshed on every access.
    pub session_ttl_secs: u64,
    /// Maximum conversation history length per session.
    pub max_conversation_history: usize,
    /// Per-user daily message quota.
    pub daily_message_limit: i64,
    /// Per-user lock timeout, in seconds.
    pub lock_timeout_secs: u64,
    /// Shared API key required on protected routes.
    pub api_key: String,
    /// Port to listen on.
    pub port: u16,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            gateway_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://action-gateway:18789".to_string())
                .trim_end_matches('/')
                .to_string(),
            gateway_timeout_secs: env::var("GATEWAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid GATEWAY_TIMEOUT_SECS")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("Invalid SESSION_TTL_SECS")?,
            max_conversation_history: env::var("MAX_CONVERSATION_HISTORY")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("Invalid MAX_CONVERSATION_HISTORY")?,
            daily_message_limit: env::var("DAILY_MESSAGE_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("Invalid DAILY_MESSAGE_LIMIT")?,
            lock_timeout_secs: env::var("LOCK_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid LOCK_TIMEOUT_SECS")?,
            api_key: env::var("API_KEY").context("API_KEY must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid PORT")?,
        })
    }
}
