// ============================================================================
// Inbound Event Handlers
// ============================================================================
//
// Maintain the local order/product projections from peer service events,
// plus a catch-all that logs every event for debugging.
//
// All handlers tolerate at-least-once delivery:
// - created for a known id   -> success (duplicate)
// - updated for unknown id   -> creates it (out-of-order delivery)
// - deleted for unknown id   -> success
//
// ============================================================================

mod debug;
mod orders;
mod products;

use std::sync::Arc;

use crate::messaging::EventType;
use crate::routing::{HandlerRegistry, RoutingError};
use crate::store::ProjectionStore;

pub use debug::DebugLogHandler;
pub use orders::OrderProjectionHandler;
pub use products::ProductProjectionHandler;

pub const CATCH_ALL_PATTERN: &str = "#";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionAction {
    Create,
    Upsert,
    Delete,
}

impl ProjectionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionAction::Create => "created",
            ProjectionAction::Upsert => "updated",
            ProjectionAction::Delete => "deleted",
        }
    }
}

/// Build the registry the consumer loops dispatch through
pub fn setup_event_handlers(store: Arc<dyn ProjectionStore>) -> Result<HandlerRegistry, RoutingError> {
    let mut registry = HandlerRegistry::new();

    let projections = [
        (EventType::OrderCreated, ProjectionAction::Create),
        (EventType::OrderUpdated, ProjectionAction::Upsert),
        (EventType::OrderDeleted, ProjectionAction::Delete),
    ];
    for (event_type, action) in projections {
        registry.register(
            event_type.as_str(),
            Arc::new(OrderProjectionHandler::new(action, store.clone())),
        )?;
    }

    let projections = [
        (EventType::ProductCreated, ProjectionAction::Create),
        (EventType::ProductUpdated, ProjectionAction::Upsert),
        (EventType::ProductDeleted, ProjectionAction::Delete),
    ];
    for (event_type, action) in projections {
        registry.register(
            event_type.as_str(),
            Arc::new(ProductProjectionHandler::new(action, store.clone())),
        )?;
    }

    registry.register(CATCH_ALL_PATTERN, Arc::new(DebugLogHandler::new()))?;

    tracing::info!(
        patterns = registry.patterns().len(),
        handlers = registry.handler_count(),
        "Event handlers registered"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{ConsumerLoop, InMemoryBroker, Settlement};
    use crate::routing::EventRouter;
    use crate::store::InMemoryStore;
    use std::time::Duration;
    use tokio::sync::watch;

    #[test]
    fn test_registers_projections_and_catch_all() {
        let registry = setup_event_handlers(Arc::new(InMemoryStore::new())).unwrap();

        assert_eq!(
            registry.patterns(),
            vec![
                "order.created",
                "order.updated",
                "order.deleted",
                "product.created",
                "product.updated",
                "product.deleted",
                "#",
            ]
        );
        assert_eq!(registry.handler_count(), 7);
    }

    #[tokio::test]
    async fn test_specific_and_catch_all_both_fire() {
        let store = Arc::new(InMemoryStore::new());
        let router = EventRouter::new(setup_event_handlers(store.clone()).unwrap());

        let body = br#"{"type":"order.created","order":{"id":5,"customerId":2},"timestamp":"2024-05-01T10:00:00Z"}"#;
        let report = router.dispatch("order.created", body).await.unwrap();
        assert_eq!(report.invoked, 2);

        let err = router.dispatch("order.created", b"{broken").await.unwrap_err();
        assert_eq!(err.invoked, 2);
        assert_eq!(err.failed_handlers().collect::<Vec<_>>(), vec!["order_created"]);

        let report = router.dispatch("customer.created", b"{}").await.unwrap();
        assert_eq!(report.invoked, 1);
    }

    #[tokio::test]
    async fn test_end_to_end_over_broker() {
        let store = Arc::new(InMemoryStore::new());
        let router = Arc::new(EventRouter::new(setup_event_handlers(store.clone()).unwrap()));
        let broker = InMemoryBroker::new();
        let subscription = broker.subscribe(&router.patterns()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(ConsumerLoop::new("e2e", router, Box::new(subscription), shutdown_rx).run());

        broker.deliver(
            "order.created",
            r#"{"type":"order.created","order":{"id":42,"customerId":1},"timestamp":"2024-05-01T10:00:00Z"}"#,
        );
        broker.deliver("order.created", "this is not json");

        for _ in 0..200 {
            if broker.settlements().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.acked, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(
            broker.settlements(),
            vec![
                Settlement::Acked(1),
                Settlement::Rejected {
                    delivery_tag: 2,
                    requeue: true
                },
            ]
        );
        assert_eq!(store.get_order(42).await.unwrap().customer_id, Some(1));
    }
}
