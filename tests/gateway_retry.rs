mod common;

use std::time::{Duration, Instant};

use common::{fast_policy, spawn_gateway, Scripted};
use courier::services::gateway::{GatewayClient, GatewayErrorKind, GatewayRequest};

fn request() -> GatewayRequest {
    GatewayRequest {
        session_id: "sess_0123456789ab".to_string(),
        message: "book dinner at 7".to_string(),
        credentials: sonic_rs::json!({}),
        history: Vec::new(),
        user_id: Some("user-1".to_string()),
        timezone: None,
    }
}

fn client(base_url: &str) -> GatewayClient {
    GatewayClient::with_retry(base_url, Duration::from_secs(5), fast_policy())
}

#[tokio::test]
async fn recovers_after_transient_server_errors() {
    let gateway = spawn_gateway(vec![
        Scripted::status(503),
        Scripted::status(503),
        Scripted::success(serde_json::json!({
            "response": "done",
            "action_type": "calendar_create",
            "tokens_used": 7
        })),
    ])
    .await;
    let client = client(&gateway.base_url);

    let started = Instant::now();
    let response = client.send_message(&request()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(response.response.as_deref(), Some("done"));
    assert_eq!(response.action_type.as_deref(), Some("calendar_create"));
    assert_eq!(response.tokens_used, Some(7));
    assert_eq!(gateway.hits(), 3);

    // Backoff between the three attempts: base*2^1 then base*2^2.
    let expected_backoff = Duration::from_millis(100 + 200);
    assert!(
        elapsed >= expected_backoff,
        "expected at least {expected_backoff:?} of backoff, got {elapsed:?}"
    );
}

#[tokio::test]
async fn rate_limited_gateway_is_retried() {
    let gateway = spawn_gateway(vec![
        Scripted::status(429),
        Scripted::success(serde_json::json!({"response": "done"})),
    ])
    .await;
    let client = client(&gateway.base_url);

    let response = client.send_message(&request()).await.unwrap();
    assert_eq!(response.response.as_deref(), Some("done"));
    assert_eq!(gateway.hits(), 2);
}

#[tokio::test]
async fn client_error_fails_immediately() {
    let gateway = spawn_gateway(vec![Scripted::status(400)]).await;
    let client = client(&gateway.base_url);

    let err = client.send_message(&request()).await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Client);
    assert!(!err.retryable());
    assert_eq!(gateway.hits(), 1);
}

#[tokio::test]
async fn unexpected_status_is_not_retried() {
    let gateway = spawn_gateway(vec![Scripted::status(500)]).await;
    let client = client(&gateway.base_url);

    let err = client.send_message(&request()).await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Unknown);
    assert!(!err.retryable());
    assert_eq!(gateway.hits(), 1);
}

#[tokio::test]
async fn exhaustion_reports_the_last_retryable_failure() {
    let gateway = spawn_gateway(vec![
        Scripted::status(503),
        Scripted::status(502),
        Scripted::status(504),
    ])
    .await;
    let client = client(&gateway.base_url);

    let err = client.send_message(&request()).await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Server);
    // Still marked retryable so the caller can surface "try again later".
    assert!(err.retryable());
    assert_eq!(gateway.hits(), 3);
}

#[tokio::test]
async fn slow_gateway_times_out_and_retries() {
    let slow = || {
        Scripted::success(serde_json::json!({"response": "late"}))
            .with_delay(Duration::from_secs(2))
    };
    let gateway = spawn_gateway(vec![slow(), slow(), slow()]).await;
    let client = GatewayClient::with_retry(&gateway.base_url, Duration::from_millis(100), fast_policy());

    let err = client.send_message(&request()).await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Timeout);
    assert!(err.retryable());
    assert_eq!(gateway.hits(), 3);
}

#[tokio::test]
async fn unreachable_gateway_is_a_connection_error() {
    // Bind then drop a listener so nothing is listening on the port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{addr}"));

    let err = client.send_message(&request()).await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Connection);
    assert!(err.retryable());
}

#[tokio::test]
async fn malformed_success_payload_is_an_unknown_error() {
    let gateway = spawn_gateway(vec![Scripted {
        status: 200,
        body: Some(serde_json::json!("not an object")),
        delay: Duration::ZERO,
    }])
    .await;
    let client = client(&gateway.base_url);

    let err = client.send_message(&request()).await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Unknown);
    assert!(!err.retryable());
    assert_eq!(gateway.hits(), 1);
}

#[tokio::test]
async fn health_probe_is_a_single_attempt() {
    let gateway = spawn_gateway(Vec::new()).await;
    let client = client(&gateway.base_url);

    assert!(client.health_check().await);
    // The probe hits /health, never /execute.
    assert_eq!(gateway.hits(), 0);
}

#[tokio::test]
async fn health_probe_reports_an_unreachable_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{addr}"));
    assert!(!client.health_check().await);
}
