//! # Ping-Mesh Service
//!
//! A backend service: answers `{cmd: "ping"}` on `external port + 30000` and,
//! unless disabled, `GET /ping` on the external port.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Instrument};

use mesh_runtime::{shutdown, ServiceArgs, ServiceRuntime, ServiceSettings};
use mesh_telemetry::{init_logging, process_span, register_metrics, TelemetryConfig};
use shared_types::EnvLookup;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServiceArgs::parse();

    let service_name = args.name.clone().unwrap_or_else(|| "pm-service".to_string());
    let telemetry = TelemetryConfig::for_service(&service_name);
    init_logging(&telemetry).context("failed to initialise logging")?;
    register_metrics().context("failed to register metrics")?;

    run(args).instrument(process_span(&telemetry)).await
}

async fn run(args: ServiceArgs) -> Result<()> {
    let settings = ServiceSettings::from_args(&args, &EnvLookup).context("invalid service configuration")?;
    let runtime = ServiceRuntime::new(settings);

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    shutdown::on_ctrl_c(shutdown_tx);

    info!(
        service = %runtime.settings().identity.name,
        delay_ms = runtime.settings().ping_delay.as_millis() as u64,
        "Starting Ping-Mesh service"
    );
    runtime.run(shutdown_rx).await
}
