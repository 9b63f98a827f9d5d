use std::sync::Arc;

use crate::kv::KeyValue;

/// Outcome of a lock acquisition attempt.
///
/// `StoreUnavailable` is modeled separately from `Acquired` so tests can
/// simulate store outages, but callers treat it as granted: availability wins
/// over strict serialization while the store is degraded, and the caller's
/// own request timeout bounds the risk window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    Busy,
    StoreUnavailable,
}

impl LockOutcome {
    /// Whether the caller may enter the critical section.
    pub fn is_granted(self) -> bool {
        !matches!(self, LockOutcome::Busy)
    }
}

/// Per-user mutual exclusion on the shared store.
///
/// The lock self-expires after its timeout even if never released, which is
/// the only crash-recovery mechanism for locks. Release is an unconditional
/// delete, not compare-and-delete: callers only release locks they believe
/// they hold, and the expiry bounds the blast radius of a wrongful release.
#[derive(Clone)]
pub struct LockManager {
    kv: Arc<dyn KeyValue>,
}

impl LockManager {
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv }
    }

    fn key(user_id: &str) -> String {
        format!("lock:{user_id}")
    }

    /// Attempts to take the lock for `user_id`, expiring after `timeout_secs`.
    pub async fn acquire(&self, user_id: &str, timeout_secs: u64) -> LockOutcome {
        match self.kv.set_nx_ex(&Self::key(user_id), "locked", timeout_secs).await {
            Ok(true) => LockOutcome::Acquired,
            Ok(false) => LockOutcome::Busy,
            Err(e) => {
                tracing::warn!("Lock store unreachable for user {}, failing open: {}", user_id, e);
                LockOutcome::StoreUnavailable
            }
        }
    }

    /// Releases the lock for `user_id`. A no-op if the lock is absent or
    /// already expired; returns `false` only when the store was unreachable.
    pub async fn release(&self, user_id: &str) -> bool {
        match self.kv.del(&Self::key(user_id)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to release lock for user {}: {}", user_id, e);
                false
            }
        }
    }
}
