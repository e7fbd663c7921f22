//! Tag to handler routing table.

use shared_types::{DispatchError, PingHandler, RequestHandler, Tag};
use std::collections::HashMap;
use std::sync::Arc;

use crate::PingRoute;

/// Read-only routing table, built once at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    routes: HashMap<Tag, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Handler for exactly `tag`, if any.
    pub fn get(&self, tag: &Tag) -> Option<Arc<dyn RequestHandler>> {
        self.routes.get(tag).cloned()
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.routes.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&Tag> {
        let mut tags: Vec<&Tag> = self.routes.keys().collect();
        tags.sort_by_key(|tag| tag.to_string());
        tags
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Collects routes; the first duplicate tag is reported by `build`.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    routes: HashMap<Tag, Arc<dyn RequestHandler>>,
    duplicate: Option<Tag>,
}

impl HandlerRegistryBuilder {
    /// Route `tag` to `handler`.
    pub fn route(mut self, tag: Tag, handler: Arc<dyn RequestHandler>) -> Self {
        if self.routes.contains_key(&tag) {
            if self.duplicate.is_none() {
                self.duplicate = Some(tag);
            }
        } else {
            self.routes.insert(tag, handler);
        }
        self
    }

    /// Route `{cmd: "ping"}` to a `PingHandler`.
    pub fn ping<H: PingHandler + 'static>(self, handler: Arc<H>) -> Self {
        self.route(Tag::ping(), Arc::new(PingRoute::new(handler)))
    }

    pub fn build(self) -> Result<HandlerRegistry, DispatchError> {
        if let Some(tag) = self.duplicate {
            return Err(DispatchError::DuplicateTag(tag));
        }
        Ok(HandlerRegistry {
            routes: self.routes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use shared_types::HandlerError;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, payload: Value) -> Result<Value, HandlerError> {
            Ok(payload)
        }
    }

    #[test]
    fn test_lookup_is_exact_on_tag() {
        let registry = HandlerRegistry::builder()
            .route(Tag::cmd("echo").with("v", "1"), Arc::new(Echo))
            .build()
            .unwrap();

        assert!(registry.contains(&Tag::cmd("echo").with("v", "1")));
        assert!(!registry.contains(&Tag::cmd("echo")));
        assert!(!registry.contains(&Tag::cmd("echo").with("v", "2")));
        assert!(registry.get(&Tag::cmd("ECHO").with("v", "1")).is_none());
    }

    #[test]
    fn test_duplicate_tag_is_rejected() {
        let result = HandlerRegistry::builder()
            .route(Tag::cmd("echo"), Arc::new(Echo))
            .route(Tag::cmd("echo"), Arc::new(Echo))
            .build();

        match result {
            Err(DispatchError::DuplicateTag(tag)) => assert_eq!(tag, Tag::cmd("echo")),
            other => panic!("expected DuplicateTag, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = HandlerRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        assert!(registry.get(&Tag::ping()).is_none());
    }
}
