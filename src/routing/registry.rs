use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use super::errors::{HandlerError, RoutingError};
use super::topic::{RoutingKey, TopicPattern};

// ============================================================================
// Handler Registry
// ============================================================================
//
// Ordered mapping from topic pattern to handlers. Populated at startup and
// then moved into the EventRouter, which only ever reads it.
//
// Invocation order for a routing key:
// - patterns in order of their first registration
// - handlers of one pattern in registration order
//
// There is no specificity-based precedence: a catch-all and a specific
// pattern both fire for the same key.
//
// ============================================================================

/// Capability implemented by every inbound event handler
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs and metrics
    fn name(&self) -> &str;

    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into an `EventHandler`
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        (self.func)(body.to_vec()).await
    }
}

struct RegistryEntry {
    pattern: TopicPattern,
    handlers: Vec<Arc<dyn EventHandler>>,
}

/// A handler resolved for a routing key, with the pattern that selected it
#[derive(Clone)]
pub struct MatchedHandler {
    pub pattern: String,
    pub handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<RegistryEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a pattern. The pattern is validated here;
    /// an invalid pattern is a configuration error.
    pub fn register(
        &mut self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<&mut Self, RoutingError> {
        let pattern = TopicPattern::parse(pattern)?;

        tracing::debug!(
            pattern = %pattern,
            handler = handler.name(),
            "Registering event handler"
        );

        match self.entries.iter_mut().find(|entry| entry.pattern == pattern) {
            Some(entry) => entry.handlers.push(handler),
            None => self.entries.push(RegistryEntry {
                pattern,
                handlers: vec![handler],
            }),
        }

        Ok(self)
    }

    /// Register an async closure as a handler
    pub fn register_fn<F, Fut>(
        &mut self,
        pattern: &str,
        name: impl Into<String>,
        func: F,
    ) -> Result<&mut Self, RoutingError>
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(pattern, Arc::new(FnHandler::new(name, func)))
    }

    /// All handlers whose pattern matches `routing_key`, in invocation order
    pub fn matching_handlers(&self, routing_key: &RoutingKey) -> Vec<MatchedHandler> {
        self.entries
            .iter()
            .filter(|entry| entry.pattern.matches(routing_key))
            .flat_map(|entry| {
                entry.handlers.iter().map(|handler| MatchedHandler {
                    pattern: entry.pattern.as_str().to_string(),
                    handler: handler.clone(),
                })
            })
            .collect()
    }

    /// Registered patterns in registration order, used as broker binding keys
    pub fn patterns(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.pattern.as_str().to_string())
            .collect()
    }

    pub fn handler_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.handlers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Arc<dyn EventHandler> {
        Arc::new(FnHandler::new(name, |_body: Vec<u8>| async { Ok::<(), HandlerError>(()) }))
    }

    fn names(handlers: &[MatchedHandler]) -> Vec<String> {
        handlers.iter().map(|m| m.handler.name().to_string()).collect()
    }

    #[test]
    fn test_invalid_pattern_fails_registration() {
        let mut registry = HandlerRegistry::new();
        let result = registry.register("a.#.b", noop("bad"));
        assert!(matches!(result, Err(RoutingError::InvalidPattern { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_same_pattern_keeps_registration_order() {
        let mut registry = HandlerRegistry::new();
        registry.register("order.created", noop("first")).unwrap();
        registry.register("order.created", noop("second")).unwrap();

        let matched = registry.matching_handlers(&RoutingKey::from("order.created"));
        assert_eq!(names(&matched), vec!["first", "second"]);
        assert_eq!(registry.patterns(), vec!["order.created"]);
    }

    #[test]
    fn test_order_follows_first_registration_of_pattern() {
        let mut registry = HandlerRegistry::new();
        registry.register("#", noop("debug")).unwrap();
        registry.register("order.created", noop("orders")).unwrap();
        registry.register("#", noop("audit")).unwrap();

        let matched = registry.matching_handlers(&RoutingKey::from("order.created"));
        assert_eq!(names(&matched), vec!["debug", "audit", "orders"]);
        assert_eq!(matched[2].pattern, "order.created");
        assert_eq!(registry.handler_count(), 3);
    }

    #[test]
    fn test_catch_all_and_specific_both_match() {
        let mut registry = HandlerRegistry::new();
        registry.register("order.created", noop("orders")).unwrap();
        registry.register("#", noop("debug")).unwrap();

        let matched = registry.matching_handlers(&RoutingKey::from("order.created"));
        assert_eq!(names(&matched), vec!["orders", "debug"]);

        let matched = registry.matching_handlers(&RoutingKey::from("product.created"));
        assert_eq!(names(&matched), vec!["debug"]);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let mut registry = HandlerRegistry::new();
        registry.register("order.*", noop("orders")).unwrap();
        assert!(registry.matching_handlers(&RoutingKey::from("product.created")).is_empty());
    }
}
