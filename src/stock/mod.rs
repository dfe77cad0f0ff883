// ============================================================================
// Stock Module
// ============================================================================
//
// Storage side of the pipeline:
// - repository - StockStore trait + Postgres implementation
// - mutator    - idempotent create/delete handlers driven by queue events
// - service    - read/update interface consumed by the HTTP layer above
//
// ============================================================================

mod mutator;
mod repository;
mod service;

pub use mutator::StockMutator;
pub use repository::{PgStockRepository, StockError, StockStore};
pub use service::StockService;

#[cfg(test)]
pub(crate) use repository::testing;
