use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::kv::{KeyValue, RedisKv};
use crate::services::gateway::GatewayClient;
use crate::services::locks::LockManager;
use crate::services::orchestrator::RequestOrchestrator;
use crate::services::rate_limit::RateLimiter;
use crate::services::sessions::SessionStore;

/// The application's state.
///
/// One instance of every component is constructed at process start and
/// shared by reference; nothing hides behind a global.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Handle to the shared key-value store, for health checks.
    pub kv: Arc<dyn KeyValue>,
    /// The session store.
    pub sessions: SessionStore,
    /// The daily quota limiter.
    pub limiter: RateLimiter,
    /// The downstream gateway client.
    pub gateway: GatewayClient,
    /// The per-message orchestrator composing the core components.
    pub orchestrator: RequestOrchestrator,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let kv: Arc<dyn KeyValue> = Arc::new(RedisKv::connect(&config.redis_url).await?);
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let sessions = SessionStore::new(
            kv.clone(),
            config.session_ttl_secs,
            config.max_conversation_history,
        );
        let locks = LockManager::new(kv.clone());
        let limiter = RateLimiter::new(kv.clone());
        let gateway = GatewayClient::new(
            &config.gateway_url,
            Duration::from_secs(config.gateway_timeout_secs),
        );
        let orchestrator = RequestOrchestrator::new(
            sessions.clone(),
            locks,
            limiter.clone(),
            gateway.clone(),
            config.daily_message_limit,
            config.lock_timeout_secs,
        );
        tracing::info!("✅ Core components initialized");

        Ok(AppState {
            config: config.clone(),
            kv,
            sessions,
            limiter,
            gateway,
            orchestrator,
        })
    }
}
