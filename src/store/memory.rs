use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::{Customer, NewCustomer, Order, Product, RecordId};

use super::{CustomerRepository, ProjectionStore, StoreError, StoreResult};

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Default)]
struct Tables {
    customers: BTreeMap<RecordId, Customer>,
    next_customer_id: RecordId,
    orders: BTreeMap<RecordId, Order>,
    products: BTreeMap<RecordId, Product>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `StoreError::Unavailable`
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn product_count(&self) -> usize {
        self.tables.read().await.products.len()
    }
}

#[async_trait]
impl ProjectionStore for InMemoryStore {
    async fn create_order(&self, order: &Order) -> StoreResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict { entity: "order", id: order.id });
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: RecordId) -> StoreResult<Order> {
        self.tables
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "order", id })
    }

    async fn upsert_order(&self, order: &Order) -> StoreResult<()> {
        self.check_writable()?;
        self.tables.write().await.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete_order(&self, id: RecordId) -> StoreResult<()> {
        self.check_writable()?;
        self.tables
            .write()
            .await
            .orders
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { entity: "order", id })
    }

    async fn orders_for_customer(&self, customer_id: RecordId) -> StoreResult<Vec<Order>> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .filter(|order| order.customer_id == Some(customer_id))
            .cloned()
            .collect())
    }

    async fn create_product(&self, product: &Product) -> StoreResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        if tables.products.contains_key(&product.id) {
            return Err(StoreError::Conflict { entity: "product", id: product.id });
        }
        tables.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: RecordId) -> StoreResult<Product> {
        self.tables
            .read()
            .await
            .products
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "product", id })
    }

    async fn upsert_product(&self, product: &Product) -> StoreResult<()> {
        self.check_writable()?;
        self.tables.write().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn delete_product(&self, id: RecordId) -> StoreResult<()> {
        self.check_writable()?;
        self.tables
            .write()
            .await
            .products
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { entity: "product", id })
    }
}

#[async_trait]
impl CustomerRepository for InMemoryStore {
    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        Ok(self.tables.read().await.customers.values().cloned().collect())
    }

    async fn get_customer(&self, id: RecordId) -> StoreResult<Customer> {
        self.tables
            .read()
            .await
            .customers
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "customer", id })
    }

    async fn create_customer(&self, customer: NewCustomer) -> StoreResult<Customer> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        tables.next_customer_id += 1;
        let customer = customer.into_customer(tables.next_customer_id);
        tables.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn update_customer(&self, id: RecordId, customer: NewCustomer) -> StoreResult<Customer> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let slot = tables
            .customers
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "customer", id })?;
        *slot = customer.into_customer(id);
        Ok(slot.clone())
    }

    async fn delete_customer(&self, id: RecordId) -> StoreResult<Customer> {
        self.check_writable()?;
        self.tables
            .write()
            .await
            .customers
            .remove(&id)
            .ok_or(StoreError::NotFound { entity: "customer", id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CustomerInput;

    fn input(username: &str) -> NewCustomer {
        CustomerInput {
            username: username.to_string(),
            first_name: "ada".to_string(),
            last_name: "lovelace".to_string(),
            ..Default::default()
        }
        .normalize()
    }

    #[tokio::test]
    async fn test_customer_ids_are_assigned_sequentially() {
        let store = InMemoryStore::new();
        let first = store.create_customer(input("ada")).await.unwrap();
        let second = store.create_customer(input("grace")).await.unwrap();

        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(store.list_customers().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_order_is_conflict() {
        let store = InMemoryStore::new();
        let order = Order { id: 10, customer_id: None };
        store.create_order(&order).await.unwrap();

        let err = store.create_order(&order).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let store = InMemoryStore::new();
        assert!(store.get_customer(1).await.unwrap_err().is_not_found());
        assert!(store.delete_product(3).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = InMemoryStore::new();
        store.fail_writes(true);
        let err = store.upsert_product(&Product { id: 1 }).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.fail_writes(false);
        store.upsert_product(&Product { id: 1 }).await.unwrap();
        assert_eq!(store.product_count().await, 1);
    }

    #[tokio::test]
    async fn test_orders_for_customer() {
        let store = InMemoryStore::new();
        store.create_order(&Order { id: 1, customer_id: Some(5) }).await.unwrap();
        store.create_order(&Order { id: 2, customer_id: Some(6) }).await.unwrap();
        store.create_order(&Order { id: 3, customer_id: Some(5) }).await.unwrap();

        let ids: Vec<_> = store
            .orders_for_customer(5)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
