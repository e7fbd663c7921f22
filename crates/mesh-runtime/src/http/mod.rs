//! axum routers for both processes.

pub mod gateway;
pub mod service;
pub mod trace;

pub use gateway::gateway_router;
pub use service::service_router;
pub use trace::request_log_layer;
