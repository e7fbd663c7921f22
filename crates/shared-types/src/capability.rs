//! # Capabilities
//!
//! Small traits services are composed from. A backend service embeds a
//! `PingHandler`; a gateway is handed an `EndpointProvider`; configuration is
//! read through a `ConfigLookup`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use shared_types::PingHandler;
//!
//! struct Pong;
//!
//! #[async_trait]
//! impl PingHandler for Pong {
//!     async fn ping(&self) -> String { "pong".to_string() }
//! }
//! ```

use crate::entities::{Endpoint, ServiceIdentity};
use crate::errors::{ConfigurationError, HandlerError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Handles the payload of one tagged request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response body for `payload`.
    async fn handle(&self, payload: Value) -> Result<Value, HandlerError>;
}

/// Answers a ping with a textual pong.
#[async_trait]
pub trait PingHandler: Send + Sync {
    /// Produce the pong message. May take arbitrary time.
    async fn ping(&self) -> String;
}

/// Maps a service identity to its transport endpoint.
pub trait EndpointProvider: Send + Sync {
    /// Resolve `identity`.
    fn endpoint_for(&self, identity: &ServiceIdentity) -> Result<Endpoint, ConfigurationError>;
}

/// Read-only key/value view over external configuration.
pub trait ConfigLookup: Send + Sync {
    /// Value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvLookup;

impl ConfigLookup for EnvLookup {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed in-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct MapLookup {
    values: HashMap<String, String>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(key, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Set a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigLookup for MapLookup {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Adapts a plain lookup function.
pub struct FnLookup<F>(pub F);

impl<F> ConfigLookup for FnLookup<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pong;

    #[async_trait]
    impl PingHandler for Pong {
        async fn ping(&self) -> String {
            "pong".to_string()
        }
    }

    #[tokio::test]
    async fn test_ping_handler_object_safe() {
        let handler: Box<dyn PingHandler> = Box::new(Pong);
        assert_eq!(handler.ping().await, "pong");
    }

    #[test]
    fn test_map_lookup() {
        let mut lookup = MapLookup::from_pairs([("SERVICE_A_PORT", "3001")]);
        lookup.insert("SERVICE_A_HOST", "10.0.0.5");
        assert_eq!(lookup.get("SERVICE_A_PORT").as_deref(), Some("3001"));
        assert_eq!(lookup.get("SERVICE_A_HOST").as_deref(), Some("10.0.0.5"));
        assert!(lookup.get("SERVICE_B_PORT").is_none());
    }

    #[test]
    fn test_fn_lookup() {
        let lookup = FnLookup(|key: &str| (key == "X").then(|| "1".to_string()));
        assert_eq!(lookup.get("X").as_deref(), Some("1"));
        assert!(lookup.get("Y").is_none());
    }
}
