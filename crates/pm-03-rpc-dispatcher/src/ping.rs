//! The ping route and the service's pong handler.

use async_trait::async_trait;
use serde_json::Value;
use shared_types::{HandlerError, PingHandler, RequestHandler};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Artificial latency of `PongService` unless configured otherwise.
pub const DEFAULT_PING_DELAY: Duration = Duration::from_millis(1000);

/// Adapts a `PingHandler` to the `RequestHandler` interface. The payload is
/// ignored; the pong text becomes a JSON string.
pub struct PingRoute<H> {
    handler: Arc<H>,
}

impl<H: PingHandler> PingRoute<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<H: PingHandler + 'static> RequestHandler for PingRoute<H> {
    async fn handle(&self, _payload: Value) -> Result<Value, HandlerError> {
        Ok(Value::String(self.handler.ping().await))
    }
}

/// Answers `"<SERVICE_NAME> - pong: <unix millis>"` after `delay`.
#[derive(Debug, Clone)]
pub struct PongService {
    service_name: String,
    delay: Duration,
}

impl PongService {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            delay: DEFAULT_PING_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Pong text stamped with `at`.
    pub fn pong_message(&self, at: SystemTime) -> String {
        let millis = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("{} - pong: {}", self.service_name, millis)
    }
}

#[async_trait]
impl PingHandler for PongService {
    async fn ping(&self) -> String {
        debug!(service = %self.service_name, delay_ms = self.delay.as_millis() as u64, "Ping received");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.pong_message(SystemTime::now())
    }
}
