//! # Service Entities
//!
//! Identity and addressing values for the services taking part in the mesh.
//!
//! A `ServiceIdentity` is built once at process start from configuration and
//! shared read-only afterwards. An `Endpoint` is always derived from an
//! identity and never stored across configuration reloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host used when a service has no `{NAME}_HOST` entry.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Logical identity of a backend service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// Logical service name (e.g. `SERVICE_A`).
    pub name: String,
    /// Externally published (HTTP-facing) port.
    pub external_port: u16,
    /// Host the service is reachable on.
    pub host: String,
}

impl ServiceIdentity {
    /// Create an identity on the default host.
    pub fn new(name: impl Into<String>, external_port: u16) -> Self {
        Self {
            name: name.into(),
            external_port,
            host: DEFAULT_HOST.to_string(),
        }
    }

    /// Override the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Prefix of this service's configuration keys (`{NAME}_PORT`, `{NAME}_HOST`).
    pub fn config_prefix(&self) -> String {
        config_prefix(&self.name)
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.host, self.external_port)
    }
}

/// Normalise a logical service name into its configuration key prefix.
///
/// `service-a` and `SERVICE_A` both map to `SERVICE_A`.
pub fn config_prefix(name: &str) -> String {
    name.trim().to_ascii_uppercase().replace('-', "_")
}

/// Concrete transport address of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP literal.
    pub host: String,
    /// Transport (TCP) port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Target usable with `TcpStream::connect` / `TcpListener::bind`.
    pub fn socket_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_defaults_to_loopback() {
        let identity = ServiceIdentity::new("SERVICE_A", 3001);
        assert_eq!(identity.host, DEFAULT_HOST);
        assert_eq!(identity.external_port, 3001);
    }

    #[test]
    fn test_config_prefix_normalises_name() {
        assert_eq!(config_prefix("service-a"), "SERVICE_A");
        assert_eq!(config_prefix(" SERVICE_B "), "SERVICE_B");
        let identity = ServiceIdentity::new("orders-api", 3005);
        assert_eq!(identity.config_prefix(), "ORDERS_API");
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("127.0.0.1", 33001);
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:33001");
        assert_eq!(endpoint.socket_target(), ("127.0.0.1", 33001));
    }

    #[test]
    fn test_endpoint_from_socket_addr() {
        let addr: std::net::SocketAddr = "127.0.0.1:40000".parse().unwrap();
        assert_eq!(Endpoint::from(addr), Endpoint::new("127.0.0.1", 40000));
    }
}
