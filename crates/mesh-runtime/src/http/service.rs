//! Debug HTTP surface of a backend service, served on its external port.

use axum::{extract::State, routing::get, Json, Router};
use pm_03_rpc_dispatcher::PongService;
use serde_json::{json, Value};
use shared_types::PingHandler;
use std::sync::Arc;

use super::trace::request_log_layer;

/// `GET /ping` answers the same pong text as the RPC route, after the same
/// delay. `GET /health` reports the service name. Requests are logged under
/// the service name.
pub fn service_router(pong: Arc<PongService>) -> Router {
    let service = pong.service_name().to_string();
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .with_state(pong)
        .layer(request_log_layer(service))
}

async fn ping(State(pong): State<Arc<PongService>>) -> String {
    pong.ping().await
}

async fn health_check(State(pong): State<Arc<PongService>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": pong.service_name(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::trace::tests::CapturedLogs;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_ping_request_is_logged() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let router = service_router(Arc::new(PongService::new("SERVICE_B").with_delay(Duration::ZERO)));

        let response = router
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = logs.text();
        let line = text
            .lines()
            .find(|line| line.contains("finished processing request"))
            .unwrap_or_else(|| panic!("no request log in:\n{text}"));
        assert!(line.contains("service=SERVICE_B"));
        assert!(line.contains("method=GET"));
        assert!(line.contains("path=/ping"));
    }
}
