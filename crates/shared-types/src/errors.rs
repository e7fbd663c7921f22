//! # Error Types
//!
//! Error taxonomy shared by the resolver, the client and the dispatcher.
//! Gateway-level errors live with the aggregator.

use crate::ipc::{Tag, WireErrorKind};
use thiserror::Error;

/// Invalid or missing service configuration. Never retried; surfaced to
/// startup code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// `{NAME}_PORT` is not set.
    #[error("missing port for service {service}: {key} is not set")]
    MissingPort { service: String, key: String },

    /// `{NAME}_PORT` is not a positive 16-bit integer.
    #[error("invalid port for service {service}: {key}={value:?}")]
    InvalidPort {
        service: String,
        key: String,
        value: String,
    },

    /// `external_port + offset` does not fit in a TCP port.
    #[error("transport port for service {service} out of range: {external_port} + {offset} > 65535")]
    PortOutOfRange {
        service: String,
        external_port: u16,
        offset: u16,
    },

    /// The process was not told which service it is.
    #[error("missing service name: {key} is not set")]
    MissingServiceName { key: String },

    /// Any other invalid setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of a single client call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Connection refused, reset or closed by the peer.
    #[error("transport error talking to {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The per-call deadline elapsed.
    #[error("call to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// The dispatcher answered with an error response.
    #[error("remote error ({kind}): {message}")]
    Remote { kind: WireErrorKind, message: String },

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl RpcError {
    /// True for `Timeout`.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for `Transport`.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// True if the peer had no handler for the request tag.
    pub fn is_unknown_tag(&self) -> bool {
        matches!(
            self,
            Self::Remote {
                kind: WireErrorKind::UnknownTag,
                ..
            }
        )
    }

    /// Short label for metrics and logs.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport_error",
            Self::Timeout { .. } => "timeout",
            Self::Remote { .. } => "remote_error",
            Self::Codec(_) => "codec_error",
        }
    }
}

/// Failure reported by a request handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Dispatcher-side errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The listener could not be bound.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Two handlers registered for the same tag.
    #[error("duplicate handler for tag {0}")]
    DuplicateTag(Tag),

    /// No handler for an inbound tag. Answered as an error response.
    #[error("no handler registered for tag {0}")]
    UnknownTag(Tag),

    /// Socket failure while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
