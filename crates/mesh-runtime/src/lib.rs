//! # Ping-Mesh Runtime
//!
//! Wires the library crates into the two processes of the mesh.
//!
//! ```text
//!              HTTP :3000
//!            ┌────────────┐
//!            │ pm-gateway │
//!            └─────┬──────┘
//!                  │ RpcClient (TCP)
//!        ┌─────────┴──────────┐
//!        ▼ :33001             ▼ :33002
//!  ┌───────────┐        ┌───────────┐
//!  │ SERVICE_A │        │ SERVICE_B │
//!  └───────────┘        └───────────┘
//!    HTTP :3001           HTTP :3002
//! ```
//!
//! ## Modules
//!
//! - `config` - CLI/environment settings for both binaries
//! - `gateway` - gateway process: aggregator plus HTTP routes
//! - `service` - backend process: dispatcher plus debug HTTP routes
//! - `http` - axum routers
//! - `shutdown` - Ctrl-C to watch-channel bridge
//!
//! ## Startup Sequence
//!
//! 1. Parse CLI flags (each falls back to its environment variable)
//! 2. Initialise logging and register metrics
//! 3. Resolve service identities and endpoints; configuration errors abort
//! 4. Bind listeners and serve until Ctrl-C

pub mod config;
pub mod gateway;
pub mod http;
pub mod service;
pub mod shutdown;

pub use config::{GatewayArgs, GatewaySettings, ServiceArgs, ServiceSettings};
pub use gateway::GatewayRuntime;
pub use service::ServiceRuntime;
