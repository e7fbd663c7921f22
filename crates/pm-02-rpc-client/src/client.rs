//! Pooled RPC client for one backend service.

use bytes::Bytes;
use futures::SinkExt;
use mesh_telemetry::{RPC_CLIENT_CALLS, RPC_CLIENT_CALL_DURATION};
use parking_lot::Mutex;
use shared_types::{Endpoint, Request, Response, RpcError, TimedResult};
use shared_wire::{FramedStream, WireCodecError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, warn, Instrument};

use crate::{CallId, ClientConfig};

/// Statistics for a client.
#[derive(Debug, Default)]
pub struct ClientStats {
    /// Calls started
    pub calls: AtomicU64,
    /// Calls that returned a result
    pub succeeded: AtomicU64,
    /// Calls that failed for any reason, timeouts included
    pub failed: AtomicU64,
    /// Calls that hit their deadline
    pub timeouts: AtomicU64,
    /// TCP connections established
    pub connections_opened: AtomicU64,
    /// Calls served on a pooled connection
    pub connections_reused: AtomicU64,
    /// Pooled connections found closed at checkout
    pub connections_discarded: AtomicU64,
}

impl ClientStats {
    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> u64 {
        Self::get(&self.calls)
    }

    pub fn succeeded(&self) -> u64 {
        Self::get(&self.succeeded)
    }

    pub fn failed(&self) -> u64 {
        Self::get(&self.failed)
    }

    pub fn timeouts(&self) -> u64 {
        Self::get(&self.timeouts)
    }

    pub fn connections_opened(&self) -> u64 {
        Self::get(&self.connections_opened)
    }

    pub fn connections_reused(&self) -> u64 {
        Self::get(&self.connections_reused)
    }

    pub fn connections_discarded(&self) -> u64 {
        Self::get(&self.connections_discarded)
    }
}

/// Client bound to one service endpoint.
///
/// Safe to share between tasks: each in-flight call owns its connection, so
/// concurrent calls never share a socket.
pub struct RpcClient {
    service_name: String,
    endpoint: Endpoint,
    config: ClientConfig,
    idle: Mutex<Vec<FramedStream>>,
    stats: ClientStats,
}

impl RpcClient {
    /// Create a client. No connection is opened until the first call.
    pub fn new(service_name: impl Into<String>, endpoint: Endpoint, config: ClientConfig) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint,
            config,
            idle: Mutex::new(Vec::new()),
            stats: ClientStats::default(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Number of pooled connections waiting for the next call.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    /// Send `request` and wait at most `timeout` for its response.
    ///
    /// `duration_ms` of the result covers send to receive on an established
    /// connection; connection setup is not counted.
    pub async fn call(&self, request: Request, timeout: Duration) -> Result<TimedResult, RpcError> {
        let call_id = CallId::new();
        let span = tracing::debug_span!(
            "rpc_call",
            call_id = %call_id,
            service = %self.service_name,
            tag = %request.tag,
        );

        async move {
            self.stats.calls.fetch_add(1, Ordering::Relaxed);

            let body = match shared_wire::encode(&request) {
                Ok(body) => body,
                Err(e) => return self.finish(Err(RpcError::Codec(e.to_string()))),
            };

            let result = match tokio::time::timeout(timeout, self.exchange(body)).await {
                Ok(result) => result,
                // The exchange future owned the connection; dropping it closed the socket.
                Err(_) => Err(RpcError::Timeout {
                    endpoint: self.endpoint.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

            self.finish(result)
        }
        .instrument(span)
        .await
    }

    /// `call` with the configured default timeout.
    pub async fn call_default(&self, request: Request) -> Result<TimedResult, RpcError> {
        self.call(request, self.config.default_timeout).await
    }

    /// Send the ping request.
    pub async fn ping(&self, timeout: Duration) -> Result<TimedResult, RpcError> {
        self.call(Request::ping(), timeout).await
    }

    /// `ping` with the configured default timeout.
    pub async fn ping_default(&self) -> Result<TimedResult, RpcError> {
        self.ping(self.config.default_timeout).await
    }

    /// Close every pooled connection.
    pub fn close_idle(&self) {
        let closed = {
            let mut idle = self.idle.lock();
            let count = idle.len();
            idle.clear();
            count
        };
        if closed > 0 {
            debug!(service = %self.service_name, closed, "Closed idle connections");
        }
    }

    /// One request/response. A pooled connection is only used if it
    /// still looks open; once the request is written, any failure is
    /// final for the call.
    async fn exchange(&self, body: Bytes) -> Result<TimedResult, RpcError> {
        let conn = match self.checkout() {
            Some(conn) => {
                self.stats.connections_reused.fetch_add(1, Ordering::Relaxed);
                conn
            }
            None => self.connect().await?,
        };
        self.attempt(conn, body).await
    }

    /// The connection goes back to the pool only when a complete response
    /// frame was read.
    async fn attempt(&self, mut conn: FramedStream, body: Bytes) -> Result<TimedResult, RpcError> {
        let start = Instant::now();

        conn.send(body)
            .await
            .map_err(|e| self.transport_error(e.to_string()))?;

        let frame = match shared_wire::recv_frame(&mut conn).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(self.transport_error("connection closed by peer".into())),
            Err(WireCodecError::Io(e)) => return Err(self.transport_error(e.to_string())),
            Err(e) => return Err(RpcError::Codec(e.to_string())),
        };
        let elapsed = start.elapsed();

        let response: Response =
            shared_wire::decode(&frame).map_err(|e| RpcError::Codec(e.to_string()))?;

        self.checkin(conn);

        match response {
            Response::Result(message) => Ok(TimedResult::new(message, elapsed)),
            Response::Error(error) => Err(RpcError::Remote {
                kind: error.kind,
                message: error.message,
            }),
        }
    }

    async fn connect(&self) -> Result<FramedStream, RpcError> {
        let stream = TcpStream::connect(self.endpoint.socket_target())
            .await
            .map_err(|e| self.transport_error(e.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }
        self.stats.connections_opened.fetch_add(1, Ordering::Relaxed);
        debug!(endpoint = %self.endpoint, "Connected");
        Ok(shared_wire::framed(stream))
    }

    /// Pop the most recent pooled connection that is still open. Closed
    /// ones are dropped here, before anything is written to them.
    fn checkout(&self) -> Option<FramedStream> {
        if !self.config.reuse_connections {
            return None;
        }
        loop {
            let conn = self.idle.lock().pop()?;
            if is_reusable(&conn) {
                return Some(conn);
            }
            self.stats.connections_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint = %self.endpoint, "Discarding closed pooled connection");
        }
    }

    fn checkin(&self, conn: FramedStream) {
        if !self.config.reuse_connections {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle_connections {
            idle.push(conn);
        }
    }

    fn transport_error(&self, reason: String) -> RpcError {
        RpcError::Transport {
            endpoint: self.endpoint.to_string(),
            reason,
        }
    }

    fn finish(&self, result: Result<TimedResult, RpcError>) -> Result<TimedResult, RpcError> {
        match &result {
            Ok(timed) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                RPC_CLIENT_CALLS
                    .with_label_values(&[self.service_name.as_str(), "ok"])
                    .inc();
                RPC_CLIENT_CALL_DURATION
                    .with_label_values(&[self.service_name.as_str()])
                    .observe(timed.duration_ms as f64 / 1000.0);
                debug!(duration_ms = timed.duration_ms, "Call completed");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                if e.is_timeout() {
                    self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                RPC_CLIENT_CALLS
                    .with_label_values(&[self.service_name.as_str(), e.outcome_label()])
                    .inc();
                warn!(error = %e, "Call failed");
            }
        }
        result
    }
}

/// An idle connection is reusable while the peer has neither closed it nor
/// sent anything unsolicited. Checked without blocking.
fn is_reusable(conn: &FramedStream) -> bool {
    if !conn.read_buffer().is_empty() {
        return false;
    }
    let mut byte = [0u8; 1];
    match conn.get_ref().try_read(&mut byte) {
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => true,
        // Ok(0) is EOF, Ok(n) is stray data, Err is a dead socket
        _ => false,
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("service_name", &self.service_name)
            .field("endpoint", &self.endpoint)
            .field("idle_connections", &self.idle_connections())
            .finish()
    }
}
