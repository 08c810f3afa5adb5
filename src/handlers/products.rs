use async_trait::async_trait;
use std::sync::Arc;

use crate::messaging::ProductEvent;
use crate::routing::{EventHandler, HandlerError};
use crate::store::ProjectionStore;

use super::ProjectionAction;

/// Keeps the local product projection in step with the products service
pub struct ProductProjectionHandler {
    name: String,
    action: ProjectionAction,
    store: Arc<dyn ProjectionStore>,
}

impl ProductProjectionHandler {
    pub fn new(action: ProjectionAction, store: Arc<dyn ProjectionStore>) -> Self {
        Self {
            name: format!("product_{}", action.as_str()),
            action,
            store,
        }
    }
}

#[async_trait]
impl EventHandler for ProductProjectionHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let event: ProductEvent = serde_json::from_slice(body)?;
        let product = event.product;

        tracing::info!(
            product_id = product.id,
            event_type = %event.event_type,
            action = self.action.as_str(),
            "Received product event"
        );

        match self.action {
            ProjectionAction::Create => match self.store.create_product(&product).await {
                Err(e) if e.is_conflict() => {
                    tracing::debug!(product_id = product.id, "Product already projected, duplicate delivery");
                }
                other => other?,
            },
            ProjectionAction::Upsert => self.store.upsert_product(&product).await?,
            ProjectionAction::Delete => match self.store.delete_product(product.id).await {
                Err(e) if e.is_not_found() => {
                    tracing::debug!(product_id = product.id, "Product already gone, nothing to delete");
                }
                other => other?,
            },
        }

        tracing::info!(
            product_id = product.id,
            action = self.action.as_str(),
            "✅ Product projection updated"
        );
        Ok(())
    }
}
