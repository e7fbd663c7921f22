//! # Shared Types Crate
//!
//! This crate contains the service identities, wire messages, error taxonomy
//! and capability traits used across the Ping-Mesh workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary
//!   (or the wire) is defined here.
//! - **Symmetric Wire Contract**: the client and the dispatcher encode and
//!   decode the very same `Request` / `Response` types.
//! - **Capabilities, not base types**: services are composed from small
//!   traits (`PingHandler`, `RequestHandler`, `EndpointProvider`).

pub mod capability;
pub mod entities;
pub mod errors;
pub mod ipc;

pub use capability::*;
pub use entities::*;
pub use errors::*;
pub use ipc::*;
