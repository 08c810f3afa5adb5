use std::sync::Arc;

use crate::domain::{Customer, CustomerInput, Order, RecordId};
use crate::messaging::{EventType, Publisher};
use crate::store::{CustomerRepository, ProjectionStore, StoreError};

// ============================================================================
// Customer Service
// ============================================================================
//
// Operations the HTTP layer calls. Every mutation commits locally first and
// then publishes a customer event on a best-effort basis: a failed publish is
// logged and never undoes or fails the write.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid customer: {0}")]
    Validation(String),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Store(e) if e.is_not_found())
    }
}

pub struct CustomerService {
    customers: Arc<dyn CustomerRepository>,
    projections: Arc<dyn ProjectionStore>,
    publisher: Option<Arc<Publisher>>,
}

impl CustomerService {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        projections: Arc<dyn ProjectionStore>,
        publisher: Option<Arc<Publisher>>,
    ) -> Self {
        Self {
            customers,
            projections,
            publisher,
        }
    }

    pub async fn list(&self) -> Result<Vec<Customer>, ServiceError> {
        Ok(self.customers.list_customers().await?)
    }

    pub async fn get(&self, id: RecordId) -> Result<Customer, ServiceError> {
        Ok(self.customers.get_customer(id).await?)
    }

    pub async fn create(&self, input: &CustomerInput) -> Result<Customer, ServiceError> {
        validate(input)?;

        let customer = self.customers.create_customer(input.normalize()).await?;
        tracing::info!(customer_id = customer.id, username = %customer.username, "✅ Customer created");

        self.announce(EventType::CustomerCreated, &customer).await;
        Ok(customer)
    }

    pub async fn update(&self, id: RecordId, input: &CustomerInput) -> Result<Customer, ServiceError> {
        validate(input)?;

        let customer = self.customers.update_customer(id, input.normalize()).await?;
        tracing::info!(customer_id = customer.id, "✅ Customer updated");

        self.announce(EventType::CustomerUpdated, &customer).await;
        Ok(customer)
    }

    /// Remove the customer and announce the record as it was before deletion
    pub async fn delete(&self, id: RecordId) -> Result<(), ServiceError> {
        let customer = self.customers.delete_customer(id).await?;
        tracing::info!(customer_id = customer.id, "Customer deleted");

        self.announce(EventType::CustomerDeleted, &customer).await;
        Ok(())
    }

    /// Orders of a customer, from the local projection fed by order events
    pub async fn orders_for(&self, customer_id: RecordId) -> Result<Vec<Order>, ServiceError> {
        self.customers.get_customer(customer_id).await?;
        Ok(self.projections.orders_for_customer(customer_id).await?)
    }

    async fn announce(&self, event_type: EventType, customer: &Customer) {
        let Some(publisher) = &self.publisher else {
            tracing::debug!(event_type = %event_type, "Publishing disabled, skipping customer event");
            return;
        };

        if let Err(e) = publisher.publish_customer_event(event_type, customer).await {
            tracing::warn!(
                event_type = %event_type,
                customer_id = customer.id,
                error = %e,
                "Customer event not published, local write kept"
            );
        }
    }
}

fn validate(input: &CustomerInput) -> Result<(), ServiceError> {
    if input.username.trim().is_empty() {
        return Err(ServiceError::Validation("username must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{CustomerEvent, InMemoryBroker};
    use crate::store::InMemoryStore;

    fn input(username: &str) -> CustomerInput {
        CustomerInput {
            username: username.to_string(),
            first_name: "jean-luc".to_string(),
            last_name: "picard".to_string(),
            ..Default::default()
        }
    }

    fn service(store: Arc<InMemoryStore>, broker: Option<InMemoryBroker>) -> CustomerService {
        let publisher = broker.map(|broker| Arc::new(Publisher::new(Arc::new(broker))));
        CustomerService::new(store.clone(), store, publisher)
    }

    #[tokio::test]
    async fn test_create_normalizes_and_publishes() {
        let store = Arc::new(InMemoryStore::new());
        let broker = InMemoryBroker::new();
        let service = service(store, Some(broker.clone()));

        let customer = service.create(&input("picard")).await.unwrap();
        assert_eq!(customer.name, "Jean-Luc PICARD");
        assert_eq!(customer.profile.first_name, "Jean-Luc");

        let sent = broker.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].routing_key, "customer.created");
        let event: CustomerEvent = serde_json::from_slice(&sent[0].body).unwrap();
        assert_eq!(event.customer, customer);
    }

    #[tokio::test]
    async fn test_local_write_survives_publish_failure() {
        let store = Arc::new(InMemoryStore::new());
        let broker = InMemoryBroker::new();
        broker.fail_publishes(true);
        let service = service(store, Some(broker.clone()));

        let created = service.create(&input("riker")).await.unwrap();
        let updated = service
            .update(
                created.id,
                &CustomerInput {
                    last_name: "riker".to_string(),
                    ..input("number-one")
                },
            )
            .await
            .unwrap();

        assert!(broker.published().is_empty());
        assert_eq!(service.get(created.id).await.unwrap(), updated);

        service.delete(created.id).await.unwrap();
        assert!(service.get(created.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_without_publisher() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store, None);

        service.create(&input("data")).await.unwrap();
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_username() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone(), None);

        let err = service.create(&input("   ")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(store.list_customers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_publishes_removed_record() {
        let store = Arc::new(InMemoryStore::new());
        let broker = InMemoryBroker::new();
        let service = service(store, Some(broker.clone()));

        let customer = service.create(&input("worf")).await.unwrap();
        service.delete(customer.id).await.unwrap();

        let sent = broker.published();
        assert_eq!(sent[1].routing_key, "customer.deleted");
        let event: CustomerEvent = serde_json::from_slice(&sent[1].body).unwrap();
        assert_eq!(event.customer.id, customer.id);

        let err = service.delete(customer.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(broker.published().len(), 2);
    }

    #[tokio::test]
    async fn test_orders_from_projection() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone(), None);
        let customer = service.create(&input("troi")).await.unwrap();

        store
            .upsert_order(&Order {
                id: 100,
                customer_id: Some(customer.id),
            })
            .await
            .unwrap();
        store
            .upsert_order(&Order {
                id: 101,
                customer_id: Some(customer.id + 1),
            })
            .await
            .unwrap();

        let orders = service.orders_for(customer.id).await.unwrap();
        assert_eq!(orders.iter().map(|o| o.id).collect::<Vec<_>>(), vec![100]);
        assert!(service.orders_for(999).await.unwrap_err().is_not_found());
    }
}
