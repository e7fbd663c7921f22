//! Client configuration.

use std::time::Duration;

/// Per-client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Keep connections open between calls.
    pub reuse_connections: bool,
    /// Upper bound on idle pooled connections.
    pub max_idle_connections: usize,
    /// Timeout used by `call_default` / `ping_default`.
    pub default_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reuse_connections: true,
            max_idle_connections: 4,
            default_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Fresh connection per call.
    pub fn without_reuse() -> Self {
        Self {
            reuse_connections: false,
            ..Self::default()
        }
    }

    /// Override the default timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}
