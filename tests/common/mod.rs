#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use courier::kv::{KeyValue, KvError};
use courier::services::gateway::RetryPolicy;

// ==================== In-memory KeyValue store ====================

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// In-memory [`KeyValue`] implementation with real expiry semantics (driven
/// by the tokio clock, so paused-time tests can fast-forward it) and a
/// toggleable outage flag for fail-open assertions.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a store outage: every operation fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Reads a live value directly, bypassing the outage flag.
    pub async fn raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone())
    }

    /// Whether a live key carries an expiry.
    pub async fn has_expiry(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.live())
            .is_some_and(|entry| entry.expires_at.is_some())
    }

    fn check(&self) -> Result<(), KvError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(KvError("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

fn deadline(ttl_secs: u64) -> Option<Instant> {
    Some(Instant::now() + Duration::from_secs(ttl_secs))
}

#[async_trait]
impl KeyValue for MemoryKv {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: deadline(ttl_secs),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, KvError> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|entry| entry.live()) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: deadline(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        if !entries.get(key).is_some_and(|entry| entry.live()) {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        self.check()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, KvError> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        if !entries.get(key).is_some_and(|entry| entry.live()) {
            entries.remove(key);
            return Ok(false);
        }
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = deadline(ttl_secs);
        }
        Ok(true)
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        if !entries.get(key).is_some_and(|entry| entry.live()) {
            entries.insert(
                key.to_string(),
                Entry {
                    value: "1".to_string(),
                    expires_at: None,
                },
            );
            return Ok(1);
        }
        let mut count = 1;
        if let Some(entry) = entries.get_mut(key) {
            count = entry.value.parse::<i64>().unwrap_or(0) + 1;
            entry.value = count.to_string();
        }
        Ok(count)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.check()?;
        let entries = self.entries.lock().await;
        let matches = |key: &str| match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        };
        Ok(entries
            .iter()
            .filter(|(key, entry)| entry.live() && matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.check()
    }
}

// ==================== Scripted gateway server ====================

/// One scripted reply from the fake gateway.
#[derive(Clone)]
pub struct Scripted {
    pub status: u16,
    pub body: Option<serde_json::Value>,
    pub delay: Duration,
}

impl Scripted {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: None,
            delay: Duration::ZERO,
        }
    }

    pub fn success(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct GatewayScript {
    responses: Arc<Mutex<VecDeque<Scripted>>>,
    hits: Arc<AtomicUsize>,
}

/// Handle to a spawned scripted gateway.
pub struct ScriptedGateway {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    /// How many `/execute` calls the gateway has received.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Spawns a local gateway that replies with `responses` in order, then falls
/// back to a plain success.
pub async fn spawn_gateway(responses: Vec<Scripted>) -> ScriptedGateway {
    let script = GatewayScript {
        responses: Arc::new(Mutex::new(responses.into())),
        hits: Arc::new(AtomicUsize::new(0)),
    };
    let hits = script.hits.clone();

    let app = Router::new()
        .route("/execute", post(scripted_execute))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(script);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ScriptedGateway {
        base_url: format!("http://{addr}"),
        hits,
    }
}

async fn scripted_execute(
    State(script): State<GatewayScript>,
) -> (StatusCode, Json<serde_json::Value>) {
    script.hits.fetch_add(1, Ordering::SeqCst);

    let next = script
        .responses
        .lock()
        .await
        .pop_front()
        .unwrap_or_else(|| Scripted::success(serde_json::json!({"response": "Action completed"})));

    if !next.delay.is_zero() {
        tokio::time::sleep(next.delay).await;
    }

    let body = next
        .body
        .unwrap_or_else(|| serde_json::json!({"error": "scripted failure"}));
    (StatusCode::from_u16(next.status).unwrap(), Json(body))
}

// ==================== Builders ====================

/// Production retry shape with millisecond delays, so retry behavior is
/// observable without real waits.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(400),
    }
}
