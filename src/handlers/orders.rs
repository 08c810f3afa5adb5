use async_trait::async_trait;
use std::sync::Arc;

use crate::messaging::OrderEvent;
use crate::routing::{EventHandler, HandlerError};
use crate::store::ProjectionStore;

use super::ProjectionAction;

/// Keeps the local order projection in step with the orders service
pub struct OrderProjectionHandler {
    name: String,
    action: ProjectionAction,
    store: Arc<dyn ProjectionStore>,
}

impl OrderProjectionHandler {
    pub fn new(action: ProjectionAction, store: Arc<dyn ProjectionStore>) -> Self {
        Self {
            name: format!("order_{}", action.as_str()),
            action,
            store,
        }
    }
}

#[async_trait]
impl EventHandler for OrderProjectionHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let event: OrderEvent = serde_json::from_slice(body)?;
        let order = event.order;

        tracing::info!(
            order_id = order.id,
            event_type = %event.event_type,
            action = self.action.as_str(),
            "Received order event"
        );

        match self.action {
            ProjectionAction::Create => match self.store.create_order(&order).await {
                Err(e) if e.is_conflict() => {
                    tracing::debug!(order_id = order.id, "Order already projected, duplicate delivery");
                }
                other => other?,
            },
            ProjectionAction::Upsert => self.store.upsert_order(&order).await?,
            ProjectionAction::Delete => match self.store.delete_order(order.id).await {
                Err(e) if e.is_not_found() => {
                    tracing::debug!(order_id = order.id, "Order already gone, nothing to delete");
                }
                other => other?,
            },
        }

        tracing::info!(order_id = order.id, action = self.action.as_str(), "✅ Order projection updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreError};

    fn body(event_type: &str, id: i64, customer_id: Option<i64>) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": event_type,
            "order": { "id": id, "customerId": customer_id },
            "timestamp": "2024-05-01T10:00:00Z",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let handler = OrderProjectionHandler::new(ProjectionAction::Create, store.clone());

        handler.handle(&body("order.created", 7, Some(1))).await.unwrap();
        handler.handle(&body("order.created", 7, Some(1))).await.unwrap();

        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.get_order(7).await.unwrap().customer_id, Some(1));
    }

    #[tokio::test]
    async fn test_update_creates_unknown_order() {
        let store = Arc::new(InMemoryStore::new());
        let handler = OrderProjectionHandler::new(ProjectionAction::Upsert, store.clone());

        handler.handle(&body("order.updated", 9, Some(2))).await.unwrap();
        handler.handle(&body("order.updated", 9, Some(3))).await.unwrap();

        assert_eq!(store.get_order(9).await.unwrap().customer_id, Some(3));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_order() {
        let store = Arc::new(InMemoryStore::new());
        let handler = OrderProjectionHandler::new(ProjectionAction::Delete, store.clone());

        handler.handle(&body("order.deleted", 4, None)).await.unwrap();
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_projects_envelope_without_timestamp_or_known_type() {
        let store = Arc::new(InMemoryStore::new());
        let create = OrderProjectionHandler::new(ProjectionAction::Create, store.clone());
        let update = OrderProjectionHandler::new(ProjectionAction::Upsert, store.clone());

        create
            .handle(br#"{"type": "order.created", "order": {"id": 5}}"#)
            .await
            .unwrap();
        create
            .handle(br#"{"type": "order.created", "order": {"id": 6}, "timestamp": null}"#)
            .await
            .unwrap();
        update
            .handle(br#"{"type": "order.status_changed", "order": {"id": 7, "customerId": 2}, "timestamp": "2024-05-01T10:00:00Z"}"#)
            .await
            .unwrap();

        assert_eq!(store.order_count().await, 3);
        assert_eq!(store.get_order(7).await.unwrap().customer_id, Some(2));
    }

    #[tokio::test]
    async fn test_malformed_body_fails() {
        let store = Arc::new(InMemoryStore::new());
        let handler = OrderProjectionHandler::new(ProjectionAction::Create, store);

        let err = handler.handle(b"{not json").await.unwrap_err();
        assert!(matches!(err, HandlerError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes(true);
        let handler = OrderProjectionHandler::new(ProjectionAction::Upsert, store);

        let err = handler.handle(&body("order.updated", 1, None)).await.unwrap_err();
        assert!(matches!(err, HandlerError::Store(StoreError::Unavailable(_))));
    }
}
