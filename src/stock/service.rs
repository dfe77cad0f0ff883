use std::sync::Arc;

use crate::models::{StockRecord, StockUpdate};
use crate::stock::{StockError, StockStore};

/// Read/update interface for the HTTP controller layer above the pipeline.
///
/// Stock rows are created and deleted exclusively by the event pipeline; this
/// service only observes them and mutates quantity. A product created moments
/// ago may not have a row yet (eventual consistency window), which simply
/// shows up as `None` here.
pub struct StockService {
    store: Arc<dyn StockStore>,
}

impl StockService {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }

    pub async fn get_stock_by_product_id(
        &self,
        product_id: i32,
    ) -> Result<Option<StockRecord>, StockError> {
        self.store.find_stock_by_product_id(product_id).await
    }

    pub async fn update(
        &self,
        stock_id: i32,
        changes: StockUpdate,
    ) -> Result<Option<StockRecord>, StockError> {
        let updated = self.store.update_stock(stock_id, &changes).await?;

        match &updated {
            Some(stock) => {
                tracing::info!(stock_id, quantity = stock.quantity, "stock updated");
            }
            None => {
                tracing::debug!(stock_id, "stock update targeted a missing row");
            }
        }

        Ok(updated)
    }
}
