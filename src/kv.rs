use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;

/// Error raised by a key-value store backend.
///
/// Carries only the backend's message: callers decide whether the failure is
/// fatal (session writes) or absorbed (locks, rate limits).
#[derive(Debug, Error)]
#[error("key-value store error: {0}")]
pub struct KvError(pub String);

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        KvError(err.to_string())
    }
}

/// Capability contract for the shared key-value store.
///
/// Only the operations the orchestration core relies on: expiring writes,
/// atomic set-if-absent (locks), atomic increment (rate limits) and prefix
/// enumeration (session discovery).
#[async_trait]
pub trait KeyValue: Send + Sync {
    /// Stores `value` under `key` with an expiry, overwriting any prior value.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError>;

    /// Stores `value` under `key` with an expiry only if the key is absent.
    /// Returns `true` iff the write happened.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, KvError>;

    /// Retrieves the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Deletes `key`. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), KvError>;

    /// Resets the expiry of `key`. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, KvError>;

    /// Atomically increments the integer stored under `key`, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, KvError>;

    /// Enumerates keys matching `pattern` (trailing-`*` prefix patterns).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Round-trip connectivity check.
    async fn ping(&self) -> Result<(), KvError>;
}

/// Redis-backed [`KeyValue`] implementation on a pooled connection manager.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    /// Connects to Redis and wraps the connection manager.
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValue for RedisKv {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, KvError> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, KvError> {
        let applied: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(applied == 1)
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let count: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(count)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), KvError> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }
}
