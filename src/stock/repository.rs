use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{StockRecord, StockUpdate};

// ============================================================================
// Stock Repository
// ============================================================================
//
// The pipeline talks to storage through the StockStore trait so the mutator
// and dispatcher can be tested against an in-memory store. The Postgres
// implementation opens a short-lived session per operation: each call checks
// a connection out of the pool and returns it when done, no transaction
// spans two mutations.
//
// Uniqueness is enforced by the schema (one row per product_id); a duplicate
// create lands on ON CONFLICT DO NOTHING and is benign.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[async_trait]
pub trait StockStore: Send + Sync {
    /// Insert a stock row with quantity 0 for the product. Already-present
    /// rows are left untouched.
    async fn create_stock(&self, product_id: i32) -> Result<(), StockError>;

    async fn find_stock_by_product_id(
        &self,
        product_id: i32,
    ) -> Result<Option<StockRecord>, StockError>;

    async fn delete_stock(&self, stock: &StockRecord) -> Result<(), StockError>;

    /// Apply a partial update to a stock row, refreshing `last_updated`.
    /// Returns `None` when no row has that id.
    async fn update_stock(
        &self,
        stock_id: i32,
        changes: &StockUpdate,
    ) -> Result<Option<StockRecord>, StockError>;
}

pub struct PgStockRepository {
    pool: PgPool,
}

impl PgStockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the stocks table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StockError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stocks (
                id           SERIAL PRIMARY KEY,
                product_id   INTEGER NOT NULL UNIQUE,
                quantity     INTEGER NOT NULL DEFAULT 0,
                last_updated TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StockStore for PgStockRepository {
    async fn create_stock(&self, product_id: i32) -> Result<(), StockError> {
        let result = sqlx::query(
            "INSERT INTO stocks (product_id, quantity) VALUES ($1, 0)
             ON CONFLICT (product_id) DO NOTHING",
        )
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(product_id, "stock row already exists, create is a no-op");
        }

        Ok(())
    }

    async fn find_stock_by_product_id(
        &self,
        product_id: i32,
    ) -> Result<Option<StockRecord>, StockError> {
        let stock = sqlx::query_as::<_, StockRecord>(
            "SELECT id, product_id, quantity, last_updated FROM stocks WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stock)
    }

    async fn delete_stock(&self, stock: &StockRecord) -> Result<(), StockError> {
        sqlx::query("DELETE FROM stocks WHERE id = $1")
            .bind(stock.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_stock(
        &self,
        stock_id: i32,
        changes: &StockUpdate,
    ) -> Result<Option<StockRecord>, StockError> {
        let stock = sqlx::query_as::<_, StockRecord>(
            "UPDATE stocks
             SET quantity = COALESCE($2, quantity), last_updated = now()
             WHERE id = $1
             RETURNING id, product_id, quantity, last_updated",
        )
        .bind(stock_id)
        .bind(changes.quantity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stock)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// In-memory StockStore with the same uniqueness guarantee as the schema.
    #[derive(Default)]
    pub struct MemoryStockStore {
        rows: Mutex<Vec<StockRecord>>,
        next_id: Mutex<i32>,
    }

    impl MemoryStockStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn row_count(&self) -> usize {
            self.rows.lock().await.len()
        }
    }

    #[async_trait]
    impl StockStore for MemoryStockStore {
        async fn create_stock(&self, product_id: i32) -> Result<(), StockError> {
            let mut rows = self.rows.lock().await;
            if rows.iter().any(|r| r.product_id == product_id) {
                return Ok(());
            }
            let mut next_id = self.next_id.lock().await;
            *next_id += 1;
            rows.push(StockRecord {
                id: *next_id,
                product_id,
                quantity: 0,
                last_updated: Utc::now(),
            });
            Ok(())
        }

        async fn find_stock_by_product_id(
            &self,
            product_id: i32,
        ) -> Result<Option<StockRecord>, StockError> {
            let rows = self.rows.lock().await;
            Ok(rows.iter().find(|r| r.product_id == product_id).cloned())
        }

        async fn delete_stock(&self, stock: &StockRecord) -> Result<(), StockError> {
            let mut rows = self.rows.lock().await;
            rows.retain(|r| r.id != stock.id);
            Ok(())
        }

        async fn update_stock(
            &self,
            stock_id: i32,
            changes: &StockUpdate,
        ) -> Result<Option<StockRecord>, StockError> {
            let mut rows = self.rows.lock().await;
            let Some(row) = rows.iter_mut().find(|r| r.id == stock_id) else {
                return Ok(None);
            };
            if let Some(quantity) = changes.quantity {
                row.quantity = quantity;
            }
            row.last_updated = Utc::now();
            Ok(Some(row.clone()))
        }
    }

    /// Store whose mutations fail a configured number of times before
    /// delegating to an inner MemoryStockStore. Reads always succeed.
    pub struct FlakyStockStore {
        inner: MemoryStockStore,
        failures_remaining: AtomicU32,
    }

    impl FlakyStockStore {
        pub fn failing(times: u32) -> Self {
            Self {
                inner: MemoryStockStore::new(),
                failures_remaining: AtomicU32::new(times),
            }
        }

        pub async fn row_count(&self) -> usize {
            self.inner.row_count().await
        }

        fn try_consume_failure(&self) -> Result<(), StockError> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(StockError::Storage(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StockStore for FlakyStockStore {
        async fn create_stock(&self, product_id: i32) -> Result<(), StockError> {
            self.try_consume_failure()?;
            self.inner.create_stock(product_id).await
        }

        async fn find_stock_by_product_id(
            &self,
            product_id: i32,
        ) -> Result<Option<StockRecord>, StockError> {
            self.inner.find_stock_by_product_id(product_id).await
        }

        async fn delete_stock(&self, stock: &StockRecord) -> Result<(), StockError> {
            self.try_consume_failure()?;
            self.inner.delete_stock(stock).await
        }

        async fn update_stock(
            &self,
            stock_id: i32,
            changes: &StockUpdate,
        ) -> Result<Option<StockRecord>, StockError> {
            self.try_consume_failure()?;
            self.inner.update_stock(stock_id, changes).await
        }
    }
}
