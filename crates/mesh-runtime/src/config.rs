//! Process settings.
//!
//! Every flag falls back to an environment variable, so both binaries run
//! unchanged from a shell, a compose file or a test harness. Per-service
//! addressing (`{NAME}_PORT`, `{NAME}_HOST`) is read through a
//! [`ConfigLookup`] so tests can supply a fixed map.

use clap::{ArgAction, Parser};
use pm_01_endpoint_resolver::{identity_from_lookup, resolve};
use pm_02_rpc_client::ClientConfig;
use pm_04_gateway_aggregator::GatewayConfig;
use shared_types::{ConfigLookup, ConfigurationError, Endpoint, ServiceIdentity};
use std::time::Duration;

/// Environment variable naming the backend service a process runs as.
pub const SERVICE_NAME_KEY: &str = "MICROSERVICE_NAME";

/// Debug HTTP listener host when no override is given.
const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Gateway process flags.
#[derive(Parser, Debug, Clone)]
#[command(name = "pm-gateway")]
#[command(about = "HTTP gateway fanning out ping calls to backend services")]
pub struct GatewayArgs {
    /// HTTP port of the gateway
    #[arg(long, env = "API_GATEWAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// HTTP bind address
    #[arg(long, env = "API_GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Backend services, comma separated
    #[arg(
        long,
        env = "GATEWAY_SERVICES",
        value_delimiter = ',',
        default_value = "SERVICE_A,SERVICE_B"
    )]
    pub services: Vec<String>,

    /// Timeout of each backend call in milliseconds
    #[arg(long, env = "GATEWAY_CALL_TIMEOUT_MS", default_value_t = 5000)]
    pub call_timeout_ms: u64,

    /// Deadline of a whole fan-out in milliseconds (unbounded if unset)
    #[arg(long, env = "GATEWAY_DEADLINE_MS")]
    pub deadline_ms: Option<u64>,

    /// Keep backend connections open between calls
    #[arg(long, env = "GATEWAY_REUSE_CONNECTIONS", default_value_t = true, action = ArgAction::Set)]
    pub reuse_connections: bool,
}

/// Resolved gateway settings.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub http_host: String,
    pub http_port: u16,
    pub services: Vec<ServiceIdentity>,
    pub gateway: GatewayConfig,
}

impl GatewaySettings {
    /// Build settings from flags plus per-service configuration.
    ///
    /// # Errors
    ///
    /// `Invalid` when no service is listed; otherwise whatever
    /// `identity_from_lookup` reports for the first bad service.
    pub fn from_args(args: &GatewayArgs, lookup: &dyn ConfigLookup) -> Result<Self, ConfigurationError> {
        let names: Vec<&str> = args
            .services
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ConfigurationError::Invalid(
                "GATEWAY_SERVICES lists no services".into(),
            ));
        }

        let services = names
            .into_iter()
            .map(|name| identity_from_lookup(name, lookup))
            .collect::<Result<Vec<_>, _>>()?;

        let call_timeout = Duration::from_millis(args.call_timeout_ms);
        let client = ClientConfig {
            reuse_connections: args.reuse_connections,
            ..ClientConfig::default()
        };
        let mut gateway = GatewayConfig::default()
            .with_client(client)
            .with_call_timeout(call_timeout);
        if let Some(ms) = args.deadline_ms {
            gateway = gateway.with_deadline(Duration::from_millis(ms));
        }
        gateway.validate()?;

        Ok(Self {
            http_host: args.host.clone(),
            http_port: args.port,
            services,
            gateway,
        })
    }

    /// `host:port` of the HTTP listener.
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

/// Backend service process flags.
#[derive(Parser, Debug, Clone)]
#[command(name = "pm-service")]
#[command(about = "Backend service answering ping requests over the mesh transport")]
pub struct ServiceArgs {
    /// Logical service name (e.g. SERVICE_A)
    #[arg(long, env = "MICROSERVICE_NAME")]
    pub name: Option<String>,

    /// Artificial latency of the ping handler in milliseconds
    #[arg(long, env = "PING_DELAY_MS", default_value_t = 1000)]
    pub ping_delay_ms: u64,

    /// Serve the debug HTTP surface on the external port
    #[arg(long, env = "SERVICE_HTTP_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub http_enabled: bool,

    /// Override the address both listeners bind to. Without it the
    /// dispatcher binds `{NAME}_HOST` and the HTTP surface binds 0.0.0.0.
    #[arg(long, env = "SERVICE_BIND_HOST")]
    pub bind_host: Option<String>,
}

/// Resolved backend service settings.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub identity: ServiceIdentity,
    /// Where the dispatcher listens: the resolved endpoint, unless a bind
    /// host override was given.
    pub transport: Endpoint,
    /// Host of the debug HTTP listener.
    pub http_host: String,
    pub ping_delay: Duration,
    pub http_enabled: bool,
}

impl ServiceSettings {
    /// Build settings from flags plus the service's own `{NAME}_PORT`.
    pub fn from_args(args: &ServiceArgs, lookup: &dyn ConfigLookup) -> Result<Self, ConfigurationError> {
        let name = args
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ConfigurationError::MissingServiceName {
                key: SERVICE_NAME_KEY.to_string(),
            })?;

        let identity = identity_from_lookup(name, lookup)?;
        let mut transport = resolve(&identity)?;

        let bind_host = args
            .bind_host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty());
        if let Some(host) = bind_host {
            transport.host = host.to_string();
        }

        Ok(Self {
            transport,
            identity,
            http_host: bind_host.unwrap_or(DEFAULT_HTTP_HOST).to_string(),
            ping_delay: Duration::from_millis(args.ping_delay_ms),
            http_enabled: args.http_enabled,
        })
    }

    /// `host:port` of the debug HTTP listener.
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.identity.external_port)
    }
}
