//! # Ping-Mesh Gateway
//!
//! Serves `/api/ping-all` and friends, fanning each request out to the
//! configured backend services over the mesh transport.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Instrument};

use mesh_runtime::{shutdown, GatewayArgs, GatewayRuntime, GatewaySettings};
use mesh_telemetry::{init_logging, process_span, register_metrics, TelemetryConfig};
use pm_01_endpoint_resolver::OffsetEndpointProvider;
use shared_types::EnvLookup;

#[tokio::main]
async fn main() -> Result<()> {
    let args = GatewayArgs::parse();

    let telemetry = TelemetryConfig::for_service("pm-gateway");
    init_logging(&telemetry).context("failed to initialise logging")?;
    register_metrics().context("failed to register metrics")?;

    run(args).instrument(process_span(&telemetry)).await
}

async fn run(args: GatewayArgs) -> Result<()> {
    let settings = GatewaySettings::from_args(&args, &EnvLookup).context("invalid gateway configuration")?;
    let runtime = GatewayRuntime::new(settings, Arc::new(OffsetEndpointProvider))
        .context("failed to resolve backend services")?;

    let listener = runtime.bind().await?;
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    shutdown::on_ctrl_c(shutdown_tx);

    info!("Starting Ping-Mesh gateway");
    runtime.serve(listener, shutdown_rx).await
}
