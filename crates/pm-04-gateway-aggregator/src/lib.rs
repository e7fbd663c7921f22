//! # Gateway Aggregator
//!
//! Calls N backend services at once and joins their answers by position.
//!
//! ## Fan-out / Join
//!
//! ```text
//! ping_all([A, B, C])
//!   │
//!   ├─ spawn (0, A.call) ─┐
//!   ├─ spawn (1, B.call) ─┼─► JoinSet ─► slots[index] = outcome
//!   └─ spawn (2, C.call) ─┘
//!                              │
//!              all slots filled (or deadline fired)
//!                              │
//!             ┌────────────────┴────────────────┐
//!             ▼                                 ▼
//!    every slot Ok ─► AggregatedResult    any Err ─► PartialFailure
//! ```
//!
//! Results are assembled strictly in request order, never in completion
//! order. Failures are never hidden: a single failed sub-call fails the whole
//! aggregate unless the caller asked for settled outcomes.

pub mod aggregator;
pub mod config;
pub mod error;

pub use aggregator::{GatewayAggregator, ServiceOutcome};
pub use config::GatewayConfig;
pub use error::{GatewayError, ServiceFailure};
