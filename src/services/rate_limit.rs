use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::Serialize;

use crate::kv::KeyValue;

/// Extra lifetime on a day-bucket key past the UTC day boundary, so the key
/// self-cleans without a separate sweep.
const RESET_BUFFER_SECS: i64 = 3600;

/// Result of a quota check. `remaining` is `-1` when the store was
/// unreachable and the request was allowed without counting.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
    fn fail_open() -> Self {
        Self {
            allowed: true,
            remaining: -1,
            reset_at: None,
        }
    }
}

/// Read-only quota snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
}

/// Day-bucketed per-user request counter on the shared store.
///
/// A soft guard, not a security boundary: when the store is unreachable the
/// limiter fails open, consistent with the lock manager's availability
/// stance.
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KeyValue>,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv }
    }

    /// Checks the user's quota for the current UTC day and counts the request
    /// iff it is allowed. A denied request never increments the counter.
    pub async fn check_and_increment(&self, user_id: &str, daily_limit: i64) -> RateLimitDecision {
        let now = Utc::now();
        let key = day_key(user_id, now);

        let current = match self.kv.get(&key).await {
            Ok(value) => value.and_then(|raw| raw.parse::<i64>().ok()).unwrap_or(0),
            Err(e) => {
                tracing::warn!("Rate limit store unreachable, allowing request for {}: {}", user_id, e);
                return RateLimitDecision::fail_open();
            }
        };

        if current >= daily_limit {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: Some(next_utc_midnight(now)),
            };
        }

        let new_count = match self.kv.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Rate limit store unreachable, allowing request for {}: {}", user_id, e);
                return RateLimitDecision::fail_open();
            }
        };

        // First request of the day owns setting the key's expiry.
        if new_count == 1 {
            let ttl = seconds_until_reset(now).max(1) as u64;
            if let Err(e) = self.kv.expire(&key, ttl).await {
                tracing::warn!("Failed to set rate limit expiry for {}: {}", user_id, e);
            }
        }

        RateLimitDecision {
            allowed: true,
            remaining: (daily_limit - new_count).max(0),
            reset_at: None,
        }
    }

    /// Reads the current quota usage without mutating anything.
    pub async fn status(&self, user_id: &str, daily_limit: i64) -> RateLimitStatus {
        let key = day_key(user_id, Utc::now());

        match self.kv.get(&key).await {
            Ok(value) => {
                let used = value.and_then(|raw| raw.parse::<i64>().ok()).unwrap_or(0);
                RateLimitStatus {
                    used,
                    limit: daily_limit,
                    remaining: (daily_limit - used).max(0),
                }
            }
            Err(e) => {
                tracing::warn!("Rate limit store unreachable for {}: {}", user_id, e);
                RateLimitStatus {
                    used: 0,
                    limit: daily_limit,
                    remaining: -1,
                }
            }
        }
    }
}

/// Counter key for `(user_id, utc_day)`; a new day means a new key.
pub fn day_key(user_id: &str, now: DateTime<Utc>) -> String {
    format!("rate_limit:{}:{}", user_id, now.format("%Y-%m-%d"))
}

/// The next UTC midnight after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn seconds_until_reset(now: DateTime<Utc>) -> i64 {
    (next_utc_midnight(now) - now).num_seconds() + RESET_BUFFER_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_key_buckets_by_utc_day() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 23, 59, 58).unwrap();
        assert_eq!(day_key("user-1", at), "rate_limit:user-1:2025-03-09");
    }

    #[test]
    fn reset_is_next_midnight() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 18, 30, 0).unwrap();
        let reset = next_utc_midnight(at);
        assert_eq!(reset, Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn expiry_spans_past_the_day_boundary() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap();
        assert_eq!(seconds_until_reset(at), 3600 + RESET_BUFFER_SECS);
    }
}
