//! Backend service process.

use anyhow::{Context, Result};
use axum::Router;
use pm_03_rpc_dispatcher::{HandlerRegistry, PongService, RpcDispatcher};
use shared_types::DispatchError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::config::ServiceSettings;
use crate::http::service_router;
use crate::shutdown;

/// A backend service: the RPC dispatcher plus the optional debug HTTP
/// surface, sharing one `PongService`.
pub struct ServiceRuntime {
    settings: ServiceSettings,
    pong: Arc<PongService>,
}

impl ServiceRuntime {
    pub fn new(settings: ServiceSettings) -> Self {
        let pong = Arc::new(
            PongService::new(settings.identity.name.clone()).with_delay(settings.ping_delay),
        );
        Self { settings, pong }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn pong(&self) -> Arc<PongService> {
        Arc::clone(&self.pong)
    }

    /// Routes served on the transport port.
    pub fn registry(&self) -> Result<HandlerRegistry, DispatchError> {
        HandlerRegistry::builder().ping(self.pong()).build()
    }

    /// Bind the dispatcher on the derived transport endpoint.
    pub async fn bind_dispatcher(&self) -> Result<RpcDispatcher, DispatchError> {
        RpcDispatcher::bind(
            self.settings.identity.name.clone(),
            &self.settings.transport,
            self.registry()?,
        )
        .await
    }

    pub fn router(&self) -> Router {
        service_router(self.pong())
    }

    /// Bind both listeners and serve until shutdown is signalled.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let dispatcher = self
            .bind_dispatcher()
            .await
            .context("failed to start RPC dispatcher")?;
        let transport = dispatcher.local_addr()?;
        let rpc = dispatcher.spawn(shutdown.clone());

        if self.settings.http_enabled {
            let addr = self.settings.http_addr();
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind service HTTP listener on {addr}"))?;
            info!(
                service = %self.settings.identity.name,
                transport = %transport,
                http = %addr,
                "Service listening"
            );
            axum::serve(listener, self.router())
                .with_graceful_shutdown(shutdown::signalled(shutdown))
                .await
                .context("service HTTP server failed")?;
        } else {
            info!(
                service = %self.settings.identity.name,
                transport = %transport,
                "Service listening (HTTP disabled)"
            );
        }

        rpc.await
            .context("RPC dispatcher task failed")?
            .context("RPC dispatcher failed")?;

        info!(service = %self.settings.identity.name, "Service stopped");
        Ok(())
    }
}
