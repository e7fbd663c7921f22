//! # Mesh Telemetry
//!
//! Observability shared by the gateway and the backend services.
//!
//! ## Components
//!
//! - **Logging**: `tracing` subscriber with an env filter, pretty output for
//!   development and JSON output for containers
//! - **Metrics**: Prometheus counters and histograms for RPC calls, dispatched
//!   requests and gateway aggregates
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mesh_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_service("SERVICE_A");
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PM_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `PM_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `PM_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, process_span};
pub use metrics::{
    encode_metrics, register_metrics, DISPATCHER_REQUESTS, GATEWAY_AGGREGATES,
    RPC_CLIENT_CALLS, RPC_CLIENT_CALL_DURATION,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}
