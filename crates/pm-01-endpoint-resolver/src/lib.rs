//! # Endpoint Resolver
//!
//! Maps a logical service to the TCP endpoint its dispatcher listens on.
//!
//! ## Routing Convention
//!
//! ```text
//! SERVICE_A_PORT=3001  ──►  tcp://127.0.0.1:33001
//!                 └── + 30000 ──┘
//! ```
//!
//! A single published (HTTP-facing) port implies a non-conflicting transport
//! port, so no registry or discovery service is needed. Two services with
//! distinct external ports always get distinct transport ports.
//!
//! ## Configuration Keys
//!
//! | Key | Required | Meaning |
//! |-----|----------|---------|
//! | `{NAME}_PORT` | yes | external port, positive integer |
//! | `{NAME}_HOST` | no | host, default `127.0.0.1` |

use shared_types::{
    config_prefix, ConfigLookup, ConfigurationError, Endpoint, EndpointProvider, ServiceIdentity,
    DEFAULT_HOST,
};
use std::collections::HashMap;
use tracing::debug;

/// Offset between a service's external port and its transport port.
pub const TRANSPORT_PORT_OFFSET: u16 = 30000;

/// Largest external port that still yields a valid transport port.
pub const MAX_EXTERNAL_PORT: u16 = u16::MAX - TRANSPORT_PORT_OFFSET;

/// Derive the transport endpoint of `identity`.
///
/// # Errors
///
/// - `InvalidPort` if the external port is 0
/// - `PortOutOfRange` if `external_port + 30000` exceeds 65535
pub fn resolve(identity: &ServiceIdentity) -> Result<Endpoint, ConfigurationError> {
    if identity.external_port == 0 {
        return Err(ConfigurationError::InvalidPort {
            service: identity.name.clone(),
            key: port_key(&identity.name),
            value: "0".to_string(),
        });
    }

    let port = identity
        .external_port
        .checked_add(TRANSPORT_PORT_OFFSET)
        .ok_or_else(|| ConfigurationError::PortOutOfRange {
            service: identity.name.clone(),
            external_port: identity.external_port,
            offset: TRANSPORT_PORT_OFFSET,
        })?;

    Ok(Endpoint::new(identity.host.clone(), port))
}

/// `{NAME}_PORT`
pub fn port_key(name: &str) -> String {
    format!("{}_PORT", config_prefix(name))
}

/// `{NAME}_HOST`
pub fn host_key(name: &str) -> String {
    format!("{}_HOST", config_prefix(name))
}

/// Build a service identity from configuration.
///
/// # Errors
///
/// - `MissingPort` if `{NAME}_PORT` is absent or blank
/// - `InvalidPort` if it is not an integer in `1..=65535`
pub fn identity_from_lookup(
    name: &str,
    lookup: &dyn ConfigLookup,
) -> Result<ServiceIdentity, ConfigurationError> {
    let name = name.trim();
    let key = port_key(name);

    let raw = lookup
        .get(&key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigurationError::MissingPort {
            service: name.to_string(),
            key: key.clone(),
        })?;

    let external_port = raw
        .parse::<u16>()
        .ok()
        .filter(|port| *port > 0)
        .ok_or_else(|| ConfigurationError::InvalidPort {
            service: name.to_string(),
            key: key.clone(),
            value: raw.clone(),
        })?;

    let host = lookup
        .get(&host_key(name))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    Ok(ServiceIdentity::new(name, external_port).with_host(host))
}

/// Read a service's identity from configuration and resolve its endpoint.
pub fn resolve_from_lookup(
    name: &str,
    lookup: &dyn ConfigLookup,
) -> Result<(ServiceIdentity, Endpoint), ConfigurationError> {
    let identity = identity_from_lookup(name, lookup)?;
    let endpoint = resolve(&identity)?;
    debug!(service = %identity.name, endpoint = %endpoint, "Resolved service endpoint");
    Ok((identity, endpoint))
}

/// The production provider: external port + 30000.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetEndpointProvider;

impl EndpointProvider for OffsetEndpointProvider {
    fn endpoint_for(&self, identity: &ServiceIdentity) -> Result<Endpoint, ConfigurationError> {
        resolve(identity)
    }
}

/// Fixed name -> endpoint table.
///
/// Names not in the table fall back to the offset rule.
#[derive(Debug, Clone, Default)]
pub struct StaticEndpointProvider {
    endpoints: HashMap<String, Endpoint>,
}

impl StaticEndpointProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `name` to `endpoint`.
    pub fn with(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoints.insert(name.into(), endpoint);
        self
    }
}

impl EndpointProvider for StaticEndpointProvider {
    fn endpoint_for(&self, identity: &ServiceIdentity) -> Result<Endpoint, ConfigurationError> {
        match self.endpoints.get(&identity.name) {
            Some(endpoint) => Ok(endpoint.clone()),
            None => resolve(identity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::MapLookup;

    #[test]
    fn test_resolve_adds_offset() {
        let endpoint = resolve(&ServiceIdentity::new("SERVICE_A", 3001)).unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 33001));
    }

    #[test]
    fn test_resolve_keeps_host() {
        let identity = ServiceIdentity::new("SERVICE_B", 3002).with_host("10.1.2.3");
        assert_eq!(resolve(&identity).unwrap().host, "10.1.2.3");
    }

    #[test]
    fn test_resolve_upper_bound() {
        let ok = resolve(&ServiceIdentity::new("EDGE", MAX_EXTERNAL_PORT)).unwrap();
        assert_eq!(ok.port, u16::MAX);

        let err = resolve(&ServiceIdentity::new("EDGE", MAX_EXTERNAL_PORT + 1)).unwrap_err();
        assert!(matches!(err, ConfigurationError::PortOutOfRange { .. }));
    }

    #[test]
    fn test_resolve_rejects_zero() {
        let err = resolve(&ServiceIdentity::new("ZERO", 0)).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPort { .. }));
    }

    #[test]
    fn test_lookup_missing_port() {
        let lookup = MapLookup::new();
        let err = identity_from_lookup("SERVICE_A", &lookup).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingPort {
                service: "SERVICE_A".into(),
                key: "SERVICE_A_PORT".into(),
            }
        );

        let blank = MapLookup::from_pairs([("SERVICE_A_PORT", "  ")]);
        assert!(matches!(
            identity_from_lookup("SERVICE_A", &blank),
            Err(ConfigurationError::MissingPort { .. })
        ));
    }

    #[test]
    fn test_lookup_non_numeric_port() {
        for bad in ["http", "30.5", "-1", "0", "70000"] {
            let lookup = MapLookup::from_pairs([("SERVICE_A_PORT", bad)]);
            let err = identity_from_lookup("SERVICE_A", &lookup).unwrap_err();
            assert!(
                matches!(err, ConfigurationError::InvalidPort { ref value, .. } if value == bad),
                "{} should be rejected, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_lookup_host_default_and_override() {
        let lookup = MapLookup::from_pairs([("SERVICE_A_PORT", "3001")]);
        assert_eq!(identity_from_lookup("SERVICE_A", &lookup).unwrap().host, DEFAULT_HOST);

        let lookup = MapLookup::from_pairs([("SERVICE_A_PORT", " 3001 "), ("SERVICE_A_HOST", "svc-a")]);
        let identity = identity_from_lookup("service-a", &lookup).unwrap();
        assert_eq!(identity.host, "svc-a");
        assert_eq!(identity.external_port, 3001);
    }

    #[test]
    fn test_resolve_from_lookup_out_of_range() {
        let lookup = MapLookup::from_pairs([("BIG_PORT", "40000")]);
        assert!(matches!(
            resolve_from_lookup("BIG", &lookup),
            Err(ConfigurationError::PortOutOfRange { .. })
        ));
    }

    #[test]
    fn test_static_provider_falls_back_to_offset() {
        let provider =
            StaticEndpointProvider::new().with("PINNED", Endpoint::new("127.0.0.1", 45555));
        let pinned = provider
            .endpoint_for(&ServiceIdentity::new("PINNED", 3001))
            .unwrap();
        assert_eq!(pinned.port, 45555);

        let other = provider
            .endpoint_for(&ServiceIdentity::new("OTHER", 3002))
            .unwrap();
        assert_eq!(other.port, 33002);
    }

    proptest! {
        #[test]
        fn prop_port_is_external_plus_offset(port in 1u16..=MAX_EXTERNAL_PORT) {
            let endpoint = resolve(&ServiceIdentity::new("SVC", port)).unwrap();
            prop_assert_eq!(u32::from(endpoint.port), u32::from(port) + 30000);
        }

        #[test]
        fn prop_distinct_external_ports_never_collide(
            a in 1u16..=MAX_EXTERNAL_PORT,
            b in 1u16..=MAX_EXTERNAL_PORT,
        ) {
            prop_assume!(a != b);
            let ea = resolve(&ServiceIdentity::new("A", a)).unwrap();
            let eb = resolve(&ServiceIdentity::new("B", b)).unwrap();
            prop_assert_ne!(ea.port, eb.port);
        }

        #[test]
        fn prop_out_of_range_rejected(port in (MAX_EXTERNAL_PORT + 1)..=u16::MAX) {
            let is_out_of_range = matches!(
                resolve(&ServiceIdentity::new("SVC", port)),
                Err(ConfigurationError::PortOutOfRange { .. })
            );
            prop_assert!(is_out_of_range);
        }
    }
}
