//! # Service Integration Tests
//!
//! Exercises a backend service process: its RPC dispatcher through a real
//! `RpcClient`, its debug HTTP surface, and its shutdown path.

use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::http::{Request as HttpRequest, StatusCode};
use serde_json::Value;
use tokio::time::timeout;
use tower::ServiceExt;

use mesh_runtime::{shutdown, ServiceRuntime, ServiceSettings};
use pm_02_rpc_client::{ClientConfig, RpcClient};
use shared_types::{Endpoint, Request, ServiceIdentity, Tag};

/// Settings that bind the dispatcher on an ephemeral loopback port.
fn settings(name: &str, delay: Duration, http_enabled: bool) -> ServiceSettings {
    ServiceSettings {
        identity: ServiceIdentity::new(name, 3001),
        transport: Endpoint::new("127.0.0.1", 0),
        http_host: "127.0.0.1".to_string(),
        ping_delay: delay,
        http_enabled,
    }
}

#[tokio::test]
async fn test_dispatcher_answers_ping_over_transport() {
    // Arrange
    let runtime = ServiceRuntime::new(settings("SERVICE_A", Duration::from_millis(100), false));
    let dispatcher = runtime.bind_dispatcher().await.expect("bind");
    let endpoint = Endpoint::from(dispatcher.local_addr().unwrap());
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let handle = dispatcher.spawn(shutdown_rx);

    // Act
    let client = RpcClient::new("SERVICE_A", endpoint, ClientConfig::default());
    let result = client.ping(Duration::from_secs(2)).await.expect("ping");

    // Assert
    let message = result.message_str().expect("text pong");
    assert!(message.starts_with("SERVICE_A - pong: "), "message: {message}");
    assert!(result.duration_ms >= 100);

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(2), handle)
        .await
        .expect("dispatcher stops")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_unknown_tag_reaches_client_as_remote_error() {
    let runtime = ServiceRuntime::new(settings("SERVICE_A", Duration::ZERO, false));
    let dispatcher = runtime.bind_dispatcher().await.expect("bind");
    let endpoint = Endpoint::from(dispatcher.local_addr().unwrap());
    let (_shutdown_tx, shutdown_rx) = shutdown::channel();
    dispatcher.spawn(shutdown_rx);

    let client = RpcClient::new("SERVICE_A", endpoint, ClientConfig::default());
    let err = client
        .call(Request::new(Tag::cmd("status"), Value::Null), Duration::from_secs(2))
        .await
        .unwrap_err();

    assert!(err.is_unknown_tag(), "unexpected error: {err}");

    // The same client keeps working afterwards.
    assert!(client.ping(Duration::from_secs(2)).await.is_ok());
    assert_eq!(client.stats().connections_opened(), 1);
}

#[tokio::test]
async fn test_http_ping_matches_rpc_pong() {
    let runtime = ServiceRuntime::new(settings("SERVICE_B", Duration::from_millis(50), true));

    let start = Instant::now();
    let response = runtime
        .router()
        .oneshot(HttpRequest::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(start.elapsed() >= Duration::from_millis(50));
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("SERVICE_B - pong: "), "body: {text}");
}

#[tokio::test]
async fn test_http_health() {
    let runtime = ServiceRuntime::new(settings("SERVICE_B", Duration::ZERO, true));

    let response = runtime
        .router()
        .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["service"], "SERVICE_B");
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    // Arrange: HTTP disabled so only the ephemeral transport port is bound
    let runtime = ServiceRuntime::new(settings("SERVICE_A", Duration::ZERO, false));
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let handle = tokio::spawn(runtime.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Act
    shutdown_tx.send(true).unwrap();

    // Assert
    let result = timeout(Duration::from_secs(2), handle)
        .await
        .expect("service stops")
        .unwrap();
    assert!(result.is_ok());
}
