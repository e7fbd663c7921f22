//! Gateway error types.

use shared_types::{ConfigurationError, RpcError};
use std::fmt;
use thiserror::Error;

/// One failed sub-call of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFailure {
    pub service: String,
    pub error: RpcError,
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.error)
    }
}

/// Errors surfaced by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// At least one sub-call failed. Every failure is listed; successful
    /// results are discarded.
    #[error("{} of {} service calls failed: {}", .failures.len(), total(.failures, .succeeded), join(.failures))]
    PartialFailure {
        failures: Vec<ServiceFailure>,
        succeeded: Vec<String>,
    },

    /// The aggregate deadline fired before every sub-call finished.
    #[error("aggregate deadline of {deadline_ms}ms exceeded; pending: {}", .pending.join(", "))]
    AggregateTimeout { pending: Vec<String>, deadline_ms: u64 },

    /// A service name the gateway was not configured with.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The same service requested twice in one fan-out. Results are keyed
    /// by service name, so each name may appear once.
    #[error("service {0} requested more than once")]
    DuplicateService(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl GatewayError {
    /// Names of the services responsible for this error.
    pub fn failed_services(&self) -> Vec<&str> {
        match self {
            Self::PartialFailure { failures, .. } => {
                failures.iter().map(|f| f.service.as_str()).collect()
            }
            Self::AggregateTimeout { pending, .. } => pending.iter().map(String::as_str).collect(),
            Self::UnknownService(name) | Self::DuplicateService(name) => vec![name.as_str()],
            Self::Configuration(_) => Vec::new(),
        }
    }

    /// Short label for metrics and logs.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::PartialFailure { .. } => "partial_failure",
            Self::AggregateTimeout { .. } => "deadline",
            Self::UnknownService(_) => "unknown_service",
            Self::DuplicateService(_) => "duplicate_service",
            Self::Configuration(_) => "configuration",
        }
    }
}

fn total(failures: &[ServiceFailure], succeeded: &[String]) -> usize {
    failures.len() + succeeded.len()
}

fn join(failures: &[ServiceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
