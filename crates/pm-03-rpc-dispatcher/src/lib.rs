//! # RPC Dispatcher
//!
//! Receives tagged requests on a service's transport port and routes each to
//! the handler registered for its tag.
//!
//! ## Request Path
//!
//! ```text
//! frame ─► decode Request ─► registry.get(tag)
//!                              │
//!                 ┌────────────┴────────────┐
//!                 ▼                         ▼
//!           handler.handle(payload)    unknown_tag error
//!                 │
//!        Ok ─► {result} / Err ─► handler_failed
//!                 │
//!                 ▼
//!          write Response frame on the same connection
//! ```
//!
//! Frames on one connection are answered in arrival order, which is what lets
//! the client match a response to the request it just wrote. Connections are
//! served independently of one another.

pub mod ping;
pub mod registry;
pub mod server;

pub use ping::{PingRoute, PongService, DEFAULT_PING_DELAY};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use server::{DispatcherStats, RpcDispatcher};
