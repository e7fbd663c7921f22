//! Gateway configuration with validation.

use pm_02_rpc_client::ClientConfig;
use shared_types::ConfigurationError;
use std::time::Duration;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Timeout applied to each sub-call.
    pub call_timeout: Duration,
    /// Upper bound for a whole fan-out. `None` waits as long as the slowest
    /// sub-call (bounded by `call_timeout`).
    pub aggregate_deadline: Option<Duration>,
    /// Settings for the per-service clients.
    pub client: ClientConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            aggregate_deadline: None,
            client: ClientConfig::default().with_timeout(DEFAULT_CALL_TIMEOUT),
        }
    }
}

impl GatewayConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self.client.default_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.aggregate_deadline = Some(deadline);
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.call_timeout.is_zero() {
            return Err(ConfigurationError::Invalid(
                "call timeout must be greater than zero".into(),
            ));
        }
        if matches!(self.aggregate_deadline, Some(d) if d.is_zero()) {
            return Err(ConfigurationError::Invalid(
                "aggregate deadline must be greater than zero".into(),
            ));
        }
        if self.client.reuse_connections && self.client.max_idle_connections == 0 {
            return Err(ConfigurationError::Invalid(
                "max_idle_connections must be at least 1 when connections are reused".into(),
            ));
        }
        Ok(())
    }
}
