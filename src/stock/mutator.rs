use std::sync::Arc;

use crate::stock::{StockError, StockStore};
use crate::utils::{retry, RetryPolicy};

// ============================================================================
// Stock Mutator
// ============================================================================
//
// The handlers the dispatcher invokes for each decoded event. Both are
// idempotent by intent:
// - create leaves an existing row untouched (uniqueness guard in the store),
//   so N delivered create events converge on exactly one row;
// - delete of an absent row is a no-op.
//
// Transient storage failures get a few in-process attempts before the error
// propagates to the dispatcher, which then requeues or dead-letters.
//
// ============================================================================

pub struct StockMutator {
    store: Arc<dyn StockStore>,
    retry_policy: RetryPolicy,
}

impl StockMutator {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self {
            store,
            retry_policy: RetryPolicy::mutation(),
        }
    }

    pub async fn create_stock_record(&self, product_id: i32) -> Result<(), StockError> {
        retry(&self.retry_policy, "create stock record", || {
            let store = Arc::clone(&self.store);
            async move { store.create_stock(product_id).await }
        })
        .await?;

        tracing::info!(product_id, "stock record ensured");
        Ok(())
    }

    pub async fn delete_stock_record(&self, product_id: i32) -> Result<(), StockError> {
        retry(&self.retry_policy, "delete stock record", || {
            let store = Arc::clone(&self.store);
            async move {
                match store.find_stock_by_product_id(product_id).await? {
                    Some(stock) => store.delete_stock(&stock).await,
                    None => {
                        // Already gone, nothing to do.
                        tracing::debug!(product_id, "no stock record to delete");
                        Ok(())
                    }
                }
            }
        })
        .await?;

        tracing::info!(product_id, "stock record removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::testing::{FlakyStockStore, MemoryStockStore};

    #[tokio::test]
    async fn create_then_delete_removes_the_row() {
        let store = Arc::new(MemoryStockStore::new());
        let mutator = StockMutator::new(store.clone());

        mutator.create_stock_record(1).await.unwrap();
        assert_eq!(store.row_count().await, 1);

        mutator.delete_stock_record(1).await.unwrap();
        assert_eq!(store.row_count().await, 0);
    }

    #[tokio::test]
    async fn repeated_creates_converge_on_one_row() {
        let store = Arc::new(MemoryStockStore::new());
        let mutator = StockMutator::new(store.clone());

        for _ in 0..4 {
            mutator.create_stock_record(9).await.unwrap();
        }

        assert_eq!(store.row_count().await, 1);
        let stock = store.find_stock_by_product_id(9).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 0);
    }

    #[tokio::test]
    async fn double_delete_is_a_noop() {
        let store = Arc::new(MemoryStockStore::new());
        let mutator = StockMutator::new(store.clone());

        mutator.create_stock_record(5).await.unwrap();
        mutator.delete_stock_record(5).await.unwrap();

        // Second delete finds nothing and must not error.
        mutator.delete_stock_record(5).await.unwrap();
        assert_eq!(store.row_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn create_retries_through_transient_storage_failures() {
        let store = Arc::new(FlakyStockStore::failing(2));
        let mutator = StockMutator::new(store.clone());

        mutator.create_stock_record(3).await.unwrap();
        assert_eq!(store.row_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn create_fails_when_storage_stays_down() {
        let store = Arc::new(FlakyStockStore::failing(u32::MAX));
        let mutator = StockMutator::new(store.clone());

        let result = mutator.create_stock_record(3).await;
        assert!(result.is_err());
        assert_eq!(store.row_count().await, 0);
    }
}
