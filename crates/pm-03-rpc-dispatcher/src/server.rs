//! Accept loop and per-connection request processing.

use mesh_telemetry::DISPATCHER_REQUESTS;
use shared_types::{DispatchError, Endpoint, Request, Response, WireErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn, Instrument};

use crate::HandlerRegistry;

/// First pause after a failed accept.
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Longest pause between failed accepts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before the next accept after `failures` consecutive accept errors.
/// Doubles from the base and saturates at the cap.
fn accept_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1u32 << shift)
        .min(ACCEPT_BACKOFF_MAX)
}

/// Statistics for a dispatcher.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Connections accepted
    pub connections_accepted: AtomicU64,
    /// Frames answered, whatever the outcome
    pub requests_served: AtomicU64,
    /// Requests whose tag had no handler
    pub unknown_tags: AtomicU64,
    /// Requests whose handler returned an error
    pub handler_failures: AtomicU64,
    /// Frames that did not decode into a request
    pub malformed_requests: AtomicU64,
}

impl DispatcherStats {
    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub fn unknown_tags(&self) -> u64 {
        self.unknown_tags.load(Ordering::Relaxed)
    }

    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    pub fn malformed_requests(&self) -> u64 {
        self.malformed_requests.load(Ordering::Relaxed)
    }
}

/// State shared by every connection task.
struct Dispatch {
    service_name: String,
    registry: Arc<HandlerRegistry>,
    stats: Arc<DispatcherStats>,
}

impl Dispatch {
    /// Turn one inbound frame into its response. Never fails: every problem
    /// becomes an error response.
    async fn answer(&self, frame: &[u8]) -> Response {
        let response = match shared_wire::decode::<Request>(frame) {
            Ok(request) => self.route(request).await,
            Err(e) => {
                warn!(service = %self.service_name, error = %e, "Malformed request frame");
                self.stats.malformed_requests.fetch_add(1, Ordering::Relaxed);
                Response::error(WireErrorKind::MalformedRequest, e.to_string())
            }
        };

        self.stats.requests_served.fetch_add(1, Ordering::Relaxed);
        let outcome = match &response {
            Response::Result(_) => "ok",
            Response::Error(error) => match error.kind {
                WireErrorKind::UnknownTag => "unknown_tag",
                WireErrorKind::HandlerFailed => "handler_failed",
                WireErrorKind::MalformedRequest => "malformed_request",
            },
        };
        DISPATCHER_REQUESTS
            .with_label_values(&[self.service_name.as_str(), outcome])
            .inc();

        response
    }

    async fn route(&self, request: Request) -> Response {
        let Some(handler) = self.registry.get(&request.tag) else {
            let err = DispatchError::UnknownTag(request.tag.clone());
            warn!(service = %self.service_name, error = %err, "Rejecting request");
            self.stats.unknown_tags.fetch_add(1, Ordering::Relaxed);
            return Response::unknown_tag(&request.tag);
        };

        debug!(service = %self.service_name, tag = %request.tag, "Dispatching request");
        match handler.handle(request.payload).await {
            Ok(result) => Response::ok(result),
            Err(e) => {
                warn!(service = %self.service_name, tag = %request.tag, error = %e, "Handler failed");
                self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                Response::error(WireErrorKind::HandlerFailed, e.to_string())
            }
        }
    }

    /// Answer frames in arrival order until the peer hangs up.
    async fn serve_connection(self: Arc<Self>, socket: TcpStream, peer: SocketAddr) {
        let mut framed = shared_wire::framed(socket);
        loop {
            let frame = match shared_wire::recv_frame(&mut framed).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    debug!(%peer, error = %e, "Connection read failed");
                    break;
                }
            };

            let response = self.answer(&frame).await;
            if let Err(e) = shared_wire::send(&mut framed, &response).await {
                debug!(%peer, error = %e, "Connection write failed");
                break;
            }
        }
        debug!(%peer, "Connection closed");
    }
}

/// A bound dispatcher, ready to serve.
pub struct RpcDispatcher {
    listener: TcpListener,
    dispatch: Arc<Dispatch>,
}

impl RpcDispatcher {
    /// Bind the transport listener for `service_name` on `endpoint`.
    pub async fn bind(
        service_name: impl Into<String>,
        endpoint: &Endpoint,
        registry: HandlerRegistry,
    ) -> Result<Self, DispatchError> {
        let listener = TcpListener::bind(endpoint.socket_target())
            .await
            .map_err(|source| DispatchError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let service_name = service_name.into();
        info!(
            service = %service_name,
            endpoint = %endpoint,
            routes = registry.len(),
            "RPC dispatcher bound"
        );

        Ok(Self {
            listener,
            dispatch: Arc::new(Dispatch {
                service_name,
                registry: Arc::new(registry),
                stats: Arc::new(DispatcherStats::default()),
            }),
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, DispatchError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service_name(&self) -> &str {
        &self.dispatch.service_name
    }

    pub fn stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.dispatch.stats)
    }

    /// Accept connections until `shutdown` turns `true` (or its sender is
    /// dropped). Open connections are closed on the way out.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<(), DispatchError> {
        let mut connections = JoinSet::new();
        let mut accept_failures = 0u32;

        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(service = %self.dispatch.service_name, "Received shutdown signal");
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        accept_failures = 0;
                        if let Err(e) = socket.set_nodelay(true) {
                            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        self.dispatch.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                        debug!(%peer, "Accepted connection");
                        connections.spawn(
                            Arc::clone(&self.dispatch)
                                .serve_connection(socket, peer)
                                .in_current_span(),
                        );
                    }
                    Err(e) => {
                        // EMFILE and friends persist until a descriptor frees up
                        accept_failures = accept_failures.saturating_add(1);
                        let pause = accept_backoff(accept_failures);
                        warn!(error = %e, failures = accept_failures, pause_ms = pause.as_millis() as u64, "Accept failed");
                        tokio::time::sleep(pause).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.abort_all();
        while connections.join_next().await.is_some() {}

        info!(service = %self.dispatch.service_name, "RPC dispatcher stopped");
        Ok(())
    }

    /// `serve` on a background task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<(), DispatchError>> {
        tokio::spawn(self.serve(shutdown).in_current_span())
    }
}
