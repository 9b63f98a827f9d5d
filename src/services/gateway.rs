use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::session::Message;

/// Maximum attempts per call, including the first.
pub const MAX_RETRIES: u32 = 3;
/// Initial backoff delay.
pub const BASE_DELAY: Duration = Duration::from_secs(1);
/// Cap on the backoff delay between attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(10);
/// Timeout for the single-attempt health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Statuses worth retrying: upstream overload or transient unavailability.
pub const RETRYABLE_STATUS_CODES: [u16; 4] = [502, 503, 504, 429];

/// Classification of a failed gateway attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GatewayErrorKind {
    #[error("gateway timeout")]
    Timeout,
    #[error("gateway connection error")]
    Connection,
    #[error("gateway server error")]
    Server,
    #[error("gateway client error")]
    Client,
    #[error("gateway unknown error")]
    Unknown,
}

impl GatewayErrorKind {
    /// Whether the same request may succeed if attempted again.
    pub fn retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Connection | Self::Server)
    }
}

/// A classified gateway failure, terminal for one `send_message` call.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

/// Maps an HTTP status to a failure classification, or `None` for success.
///
/// Statuses outside the retryable set and the 4xx range (e.g. a bare 500)
/// are unknown failure modes and deliberately not retried.
pub fn classify_status(status: u16) -> Option<GatewayErrorKind> {
    if RETRYABLE_STATUS_CODES.contains(&status) {
        Some(GatewayErrorKind::Server)
    } else if (400..500).contains(&status) {
        Some(GatewayErrorKind::Client)
    } else if (200..300).contains(&status) {
        None
    } else {
        Some(GatewayErrorKind::Unknown)
    }
}

/// Retry schedule for [`GatewayClient::send_message`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: `min(base * 2^attempt, max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// One in-flight request to the action gateway. Not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayRequest {
    pub session_id: String,
    pub message: String,
    pub credentials: sonic_rs::Value,
    pub history: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// The gateway's reply. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub details: Option<sonic_rs::Value>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
}

/// Client for the downstream conversational-action gateway.
///
/// Retries transient failures with capped exponential backoff; mutates no
/// state beyond the network call itself.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GatewayClient {
    /// Creates a client with the default retry schedule.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self::with_retry(base_url, timeout, RetryPolicy::default())
    }

    /// Creates a client with an explicit retry schedule.
    pub fn with_retry(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            retry,
        }
    }

    /// Sends one message to the gateway, retrying transient failures.
    ///
    /// Retryable: connection failures, request timeouts and the statuses in
    /// [`RETRYABLE_STATUS_CODES`]. Client errors (4xx) and unknown failure
    /// modes terminate immediately. After the final attempt the last observed
    /// failure is returned, still carrying its retryable classification so
    /// the caller can surface "try again later" instead of a hard error.
    pub async fn send_message(
        &self,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut last_error: Option<GatewayError> = None;

        for attempt in 1..=self.retry.max_retries {
            tracing::info!(
                "[{}] Attempt {}/{}: sending message to gateway",
                request.session_id,
                attempt,
                self.retry.max_retries
            );

            match self.attempt(request).await {
                Ok(response) => {
                    tracing::info!(
                        "[{}] Gateway success on attempt {}",
                        request.session_id,
                        attempt
                    );
                    return Ok(response);
                }
                Err(err) if err.retryable() => {
                    tracing::warn!(
                        "[{}] {} on attempt {}, retrying...",
                        request.session_id,
                        err,
                        attempt
                    );
                    let final_attempt = attempt == self.retry.max_retries;
                    last_error = Some(err);
                    if !final_attempt {
                        let delay = self.retry.backoff_delay(attempt);
                        tracing::debug!("Waiting {:?} before retry attempt {}", delay, attempt + 1);
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    tracing::error!("[{}] {} on attempt {}", request.session_id, err, attempt);
                    return Err(err);
                }
            }
        }

        tracing::error!(
            "[{}] All {} attempts failed",
            request.session_id,
            self.retry.max_retries
        );
        Err(last_error.unwrap_or_else(|| {
            GatewayError::new(GatewayErrorKind::Unknown, "all retry attempts exhausted")
        }))
    }

    async fn attempt(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let sent = self
            .http
            .post(format!("{}/execute", self.base_url))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                return Err(GatewayError::new(GatewayErrorKind::Timeout, "request timed out"));
            }
            Err(err) if err.is_connect() => {
                return Err(GatewayError::new(
                    GatewayErrorKind::Connection,
                    format!("failed to connect to gateway: {err}"),
                ));
            }
            Err(err) => {
                return Err(GatewayError::new(
                    GatewayErrorKind::Unknown,
                    format!("unexpected transport error: {err}"),
                ));
            }
        };

        let status = response.status().as_u16();
        match classify_status(status) {
            None => {
                let bytes = response.bytes().await.map_err(|err| {
                    GatewayError::new(
                        GatewayErrorKind::Unknown,
                        format!("invalid gateway payload: {err}"),
                    )
                })?;
                sonic_rs::from_slice::<GatewayResponse>(&bytes).map_err(|err| {
                    GatewayError::new(
                        GatewayErrorKind::Unknown,
                        format!("invalid gateway payload: {err}"),
                    )
                })
            }
            Some(GatewayErrorKind::Client) => {
                let body = response.text().await.unwrap_or_default();
                tracing::error!("Gateway client error {}: {}", status, body);
                Err(GatewayError::new(
                    GatewayErrorKind::Client,
                    format!("client error: {status}"),
                ))
            }
            Some(kind) => Err(GatewayError::new(kind, format!("server returned {status}"))),
        }
    }

    /// Single-attempt readiness probe with a short fixed timeout. Never retries.
    pub async fn health_check(&self) -> bool {
        let probe = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match probe {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(err) => {
                tracing::warn!("Gateway health check failed: {}", err);
                false
            }
        }
    }
}
