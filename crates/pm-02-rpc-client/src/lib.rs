//! # RPC Client
//!
//! Sends one tagged request to a backend service and waits for the matching
//! response, measuring the round trip.
//!
//! ## Call Path
//!
//! ```text
//! call(request, timeout)
//!   │
//!   ├─ checkout idle connection ── or ── connect(endpoint)
//!   ├─ start = now
//!   ├─ write Request frame
//!   ├─ read next frame ───────────► Response
//!   ├─ duration_ms = now - start
//!   └─ return connection to pool ─► TimedResult { message, duration_ms }
//! ```
//!
//! ## Correlation
//!
//! A connection carries exactly one outstanding request: it is checked out of
//! the pool for the whole call, so the next frame read is the answer to the
//! request just written. A connection whose call timed out is closed and
//! never reused, so a late answer can not be attributed to a later call.

pub mod call_id;
pub mod client;
pub mod config;

pub use call_id::CallId;
pub use client::{ClientStats, RpcClient};
pub use config::ClientConfig;
