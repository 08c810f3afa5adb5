// ============================================================================
// Store Module - persistence ports and adapters
// ============================================================================
//
// Event handlers and the customer service talk to storage only through the
// traits below. Adapters:
// - memory/    - in-process maps, used by tests and local runs
// - postgres/  - sqlx over Postgres; the schema is managed outside this crate
//
// ============================================================================

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::{Customer, NewCustomer, Order, Product, RecordId};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: RecordId },

    #[error("{entity} {id} already exists")]
    Conflict { entity: &'static str, id: RecordId },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Local projections of records owned by the orders and products services
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    async fn create_order(&self, order: &Order) -> StoreResult<()>;
    async fn get_order(&self, id: RecordId) -> StoreResult<Order>;
    /// Insert or replace
    async fn upsert_order(&self, order: &Order) -> StoreResult<()>;
    async fn delete_order(&self, id: RecordId) -> StoreResult<()>;
    async fn orders_for_customer(&self, customer_id: RecordId) -> StoreResult<Vec<Order>>;

    async fn create_product(&self, product: &Product) -> StoreResult<()>;
    async fn get_product(&self, id: RecordId) -> StoreResult<Product>;
    async fn upsert_product(&self, product: &Product) -> StoreResult<()>;
    async fn delete_product(&self, id: RecordId) -> StoreResult<()>;
}

/// The customer records this service owns
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn list_customers(&self) -> StoreResult<Vec<Customer>>;
    async fn get_customer(&self, id: RecordId) -> StoreResult<Customer>;
    /// Persist a new customer and return it with its assigned id
    async fn create_customer(&self, customer: NewCustomer) -> StoreResult<Customer>;
    async fn update_customer(&self, id: RecordId, customer: NewCustomer) -> StoreResult<Customer>;
    async fn delete_customer(&self, id: RecordId) -> StoreResult<Customer>;
}
