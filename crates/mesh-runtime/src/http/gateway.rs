//! Gateway HTTP surface, mounted under `/api`.
//!
//! | Route | Success | Failure |
//! |-------|---------|---------|
//! | `GET /api/ping-all` | 200 aggregate | 502 partial failure, 504 deadline |
//! | `GET /api/ping-all?services=A,B` | 200 subset | 404 unknown service, 400 repeated service |
//! | `GET /api/ping-all?mode=settled` | 200 per-service outcomes | 400 bad mode |
//! | `GET /api/ping/{service}` | 200 timed result | 404 unknown, 502 failed |
//! | `GET /api/health` | 200 | |
//! | `GET /api/metrics` | 200 Prometheus text | 500 |
//!
//! Every request is logged through [`request_log_layer`].

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use pm_04_gateway_aggregator::{GatewayAggregator, GatewayError, ServiceOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::TimedResult;
use std::sync::Arc;
use tracing::error;

use super::trace::request_log_layer;

/// Process name on gateway request spans.
const GATEWAY_PROCESS: &str = "pm-gateway";

/// Shared router state.
#[derive(Clone)]
struct AppState {
    aggregator: Arc<GatewayAggregator>,
}

#[derive(Debug, Default, Deserialize)]
struct PingAllQuery {
    /// Comma-separated subset of registered services
    services: Option<String>,
    /// `strict` (default) or `settled`
    mode: Option<String>,
}

/// One entry of a settled fan-out.
#[derive(Debug, Serialize)]
struct SettledEntry<'a> {
    service: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<&'a TimedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> From<&'a ServiceOutcome> for SettledEntry<'a> {
    fn from(outcome: &'a ServiceOutcome) -> Self {
        match &outcome.result {
            Ok(result) => Self {
                service: &outcome.service,
                ok: Some(result),
                error: None,
            },
            Err(e) => Self {
                service: &outcome.service,
                ok: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Build the gateway router.
pub fn gateway_router(aggregator: Arc<GatewayAggregator>) -> Router {
    let api = Router::new()
        .route("/ping-all", get(ping_all))
        .route("/ping/:service", get(ping_one))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics));

    Router::new()
        .nest("/api", api)
        .with_state(AppState { aggregator })
        .layer(request_log_layer(GATEWAY_PROCESS))
}

async fn ping_all(State(state): State<AppState>, Query(query): Query<PingAllQuery>) -> Response {
    let names: Vec<String> = match &query.services {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        None => state
            .aggregator
            .service_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    match query.mode.as_deref() {
        None | Some("strict") => match state.aggregator.ping_all_named(names.as_slice()).await {
            Ok(aggregate) => (StatusCode::OK, Json(aggregate)).into_response(),
            Err(e) => gateway_error_response(&e),
        },
        Some("settled") => match state.aggregator.ping_all_named_settled(names.as_slice()).await {
            Ok(outcomes) => {
                let entries: Vec<SettledEntry<'_>> = outcomes.iter().map(SettledEntry::from).collect();
                (StatusCode::OK, Json(entries)).into_response()
            }
            Err(e) => gateway_error_response(&e),
        },
        Some(other) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("unknown mode {other:?}, expected \"strict\" or \"settled\""),
                "kind": "bad_request",
            })),
        )
            .into_response(),
    }
}

async fn ping_one(State(state): State<AppState>, Path(service): Path<String>) -> Response {
    match state.aggregator.ping_one(&service).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => gateway_error_response(&e),
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "services": state.aggregator.service_names(),
    }))
}

async fn metrics() -> Response {
    match mesh_telemetry::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// HTTP status for a gateway error.
pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::PartialFailure { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::AggregateTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::UnknownService(_) => StatusCode::NOT_FOUND,
        GatewayError::DuplicateService(_) => StatusCode::BAD_REQUEST,
        GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn gateway_error_response(error: &GatewayError) -> Response {
    let failures: Vec<_> = match error {
        GatewayError::PartialFailure { failures, .. } => failures
            .iter()
            .map(|f| json!({ "service": f.service, "error": f.error.to_string() }))
            .collect(),
        _ => Vec::new(),
    };

    let body = json!({
        "error": error.to_string(),
        "kind": error.outcome_label(),
        "services": error.failed_services(),
        "failures": failures,
    });
    (status_for(error), Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::trace::tests::CapturedLogs;
    use axum::body::Body;
    use axum::http::Request;
    use pm_01_endpoint_resolver::StaticEndpointProvider;
    use pm_04_gateway_aggregator::GatewayConfig;
    use shared_types::{Endpoint, ServiceIdentity};
    use tower::ServiceExt;

    fn router() -> Router {
        let provider = StaticEndpointProvider::new().with("SERVICE_A", Endpoint::new("127.0.0.1", 1));
        let aggregator = GatewayAggregator::new(
            vec![ServiceIdentity::new("SERVICE_A", 3001)],
            Arc::new(provider),
            GatewayConfig::default(),
        )
        .unwrap();
        gateway_router(Arc::new(aggregator))
    }

    #[tokio::test]
    async fn test_requests_are_logged() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let ok = router()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let missing = router()
            .oneshot(Request::builder().uri("/api/ping/SERVICE_X").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let text = logs.text();
        let finished: Vec<&str> = text
            .lines()
            .filter(|line| line.contains("finished processing request"))
            .collect();
        assert_eq!(finished.len(), 2, "log output:\n{text}");
        assert!(finished[0].contains("service=pm-gateway"));
        assert!(finished[0].contains("path=/api/health"));
        assert!(finished[0].contains("status=200"));
        assert!(finished[1].contains("path=/api/ping/SERVICE_X"));
        assert!(finished[1].contains("status=404"));
    }
}
