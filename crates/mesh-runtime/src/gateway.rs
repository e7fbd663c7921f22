//! Gateway process.

use anyhow::{Context, Result};
use axum::Router;
use pm_04_gateway_aggregator::{GatewayAggregator, GatewayError};
use shared_types::EndpointProvider;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::config::GatewaySettings;
use crate::http::gateway_router;
use crate::shutdown;

/// The gateway: one aggregator behind the HTTP surface.
pub struct GatewayRuntime {
    settings: GatewaySettings,
    aggregator: Arc<GatewayAggregator>,
}

impl GatewayRuntime {
    /// Resolve every configured service and build its client.
    pub fn new(settings: GatewaySettings, provider: Arc<dyn EndpointProvider>) -> Result<Self, GatewayError> {
        let aggregator = GatewayAggregator::new(
            settings.services.clone(),
            provider,
            settings.gateway.clone(),
        )?;

        Ok(Self {
            settings,
            aggregator: Arc::new(aggregator),
        })
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn aggregator(&self) -> Arc<GatewayAggregator> {
        Arc::clone(&self.aggregator)
    }

    pub fn router(&self) -> Router {
        gateway_router(self.aggregator())
    }

    /// Bind the configured HTTP address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.settings.http_addr();
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind gateway HTTP listener on {addr}"))
    }

    /// Serve HTTP on `listener` until shutdown is signalled.
    pub async fn serve(self, listener: TcpListener, shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = listener.local_addr().context("gateway listener has no address")?;
        info!(
            addr = %addr,
            services = ?self.aggregator.service_names(),
            "Gateway listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown::signalled(shutdown))
            .await
            .context("gateway HTTP server failed")?;

        info!("Gateway stopped");
        Ok(())
    }
}
