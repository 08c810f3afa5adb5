use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

use crate::domain::{Address, Company, Customer, NewCustomer, Order, Product, Profile, RecordId};

use super::{CustomerRepository, ProjectionStore, StoreError, StoreResult};

// ============================================================================
// Postgres Store (sqlx)
// ============================================================================
//
// Expected tables (created by the deployment's migrations):
//
//   customers(id BIGSERIAL PK, username TEXT, first_name TEXT, last_name TEXT,
//             name TEXT, postal_code TEXT, city TEXT, company_name TEXT)
//   orders(id BIGINT PK, customer_id BIGINT NULL)
//   products(id BIGINT PK)
//
// ============================================================================

const CUSTOMER_COLUMNS: &str =
    "id, username, first_name, last_name, name, postal_code, city, company_name";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(dsn: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(dsn)
            .await?;

        tracing::info!(max_connections = max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    fn row_to_customer(row: &PgRow) -> StoreResult<Customer> {
        let first_name: String = row.try_get("first_name")?;
        let last_name: String = row.try_get("last_name")?;

        Ok(Customer {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            name: row.try_get("name")?,
            address: Address {
                postal_code: row.try_get("postal_code")?,
                city: row.try_get("city")?,
            },
            company: Company {
                company_name: row.try_get("company_name")?,
            },
            profile: Profile {
                first_name: first_name.clone(),
                last_name: last_name.clone(),
            },
            first_name,
            last_name,
        })
    }

    fn row_to_order(row: &PgRow) -> StoreResult<Order> {
        Ok(Order {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
        })
    }
}

#[async_trait]
impl ProjectionStore for PgStore {
    async fn create_order(&self, order: &Order) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO orders (id, customer_id) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(order.id)
        .bind(order.customer_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict { entity: "order", id: order.id });
        }
        Ok(())
    }

    async fn get_order(&self, id: RecordId) -> StoreResult<Order> {
        let row = sqlx::query("SELECT id, customer_id FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "order", id })?;

        Self::row_to_order(&row)
    }

    async fn upsert_order(&self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, customer_id) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET customer_id = EXCLUDED.customer_id",
        )
        .bind(order.id)
        .bind(order.customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_order(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "order", id });
        }
        Ok(())
    }

    async fn orders_for_customer(&self, customer_id: RecordId) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query("SELECT id, customer_id FROM orders WHERE customer_id = $1 ORDER BY id")
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn create_product(&self, product: &Product) -> StoreResult<()> {
        let result = sqlx::query("INSERT INTO products (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(product.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict { entity: "product", id: product.id });
        }
        Ok(())
    }

    async fn get_product(&self, id: RecordId) -> StoreResult<Product> {
        let row = sqlx::query("SELECT id FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "product", id })?;

        Ok(Product { id: row.try_get("id")? })
    }

    async fn upsert_product(&self, product: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO products (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(product.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_product(&self, id: RecordId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "product", id });
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for PgStore {
    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let rows = sqlx::query(&format!("SELECT {} FROM customers ORDER BY id", CUSTOMER_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_customer).collect()
    }

    async fn get_customer(&self, id: RecordId) -> StoreResult<Customer> {
        let row = sqlx::query(&format!("SELECT {} FROM customers WHERE id = $1", CUSTOMER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "customer", id })?;

        Self::row_to_customer(&row)
    }

    async fn create_customer(&self, customer: NewCustomer) -> StoreResult<Customer> {
        let row = sqlx::query(&format!(
            "INSERT INTO customers (username, first_name, last_name, name, postal_code, city, company_name)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            CUSTOMER_COLUMNS
        ))
        .bind(&customer.username)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.name)
        .bind(&customer.address.postal_code)
        .bind(&customer.address.city)
        .bind(&customer.company.company_name)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_customer(&row)
    }

    async fn update_customer(&self, id: RecordId, customer: NewCustomer) -> StoreResult<Customer> {
        let row = sqlx::query(&format!(
            "UPDATE customers
             SET username = $2, first_name = $3, last_name = $4, name = $5,
                 postal_code = $6, city = $7, company_name = $8
             WHERE id = $1
             RETURNING {}",
            CUSTOMER_COLUMNS
        ))
        .bind(id)
        .bind(&customer.username)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.name)
        .bind(&customer.address.postal_code)
        .bind(&customer.address.city)
        .bind(&customer.company.company_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound { entity: "customer", id })?;

        Self::row_to_customer(&row)
    }

    async fn delete_customer(&self, id: RecordId) -> StoreResult<Customer> {
        let row = sqlx::query(&format!("DELETE FROM customers WHERE id = $1 RETURNING {}", CUSTOMER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "customer", id })?;

        Self::row_to_customer(&row)
    }
}
