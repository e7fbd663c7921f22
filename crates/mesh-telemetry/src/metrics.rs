//! Prometheus metrics for Ping-Mesh processes.
//!
//! All metrics follow the naming convention: `pm_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{exponential_buckets, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Once;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Client calls by target service and outcome
    pub static ref RPC_CLIENT_CALLS: CounterVec = CounterVec::new(
        Opts::new("pm_rpc_client_calls_total", "RPC client calls"),
        &["service", "outcome"]  // outcome: ok/transport_error/timeout/remote_error/codec_error
    ).expect("metric creation failed");

    /// Client-measured call latency
    pub static ref RPC_CLIENT_CALL_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "pm_rpc_client_call_duration_seconds",
            "Time from send to response for successful RPC calls"
        ).buckets(exponential_buckets(0.001, 2.0, 15).expect("valid buckets")),
        &["service"]
    ).expect("metric creation failed");

    /// Requests served by a dispatcher
    pub static ref DISPATCHER_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("pm_dispatcher_requests_total", "Requests handled by the RPC dispatcher"),
        &["service", "outcome"]  // outcome: ok/unknown_tag/handler_failed/malformed_request
    ).expect("metric creation failed");

    /// Gateway fan-outs by outcome
    pub static ref GATEWAY_AGGREGATES: CounterVec = CounterVec::new(
        Opts::new("pm_gateway_aggregates_total", "Gateway fan-out calls"),
        &["outcome"]  // outcome: complete/partial_failure/deadline
    ).expect("metric creation failed");
}

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(RPC_CLIENT_CALLS.clone()),
            Box::new(RPC_CLIENT_CALL_DURATION.clone()),
            Box::new(DISPATCHER_REQUESTS.clone()),
            Box::new(GATEWAY_AGGREGATES.clone()),
        ];

        for metric in metrics {
            if let Err(e) = REGISTRY.register(metric) {
                result = Err(TelemetryError::MetricsInit(e.to_string()));
                return;
            }
        }
    });
    result
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
