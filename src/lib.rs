// ============================================================================
// stock-sync - Asynchronous stock synchronization pipeline
// ============================================================================
//
// Keeps stock records in step with product lifecycle events delivered over a
// durable AMQP queue:
//
//   product service --publish--> broker queue --consume--> stock mutation
//
// Modules:
// - messaging/ - event publisher, broker connection manager, dispatcher
// - stock/     - storage repository, idempotent mutator, read/update service
// - lifecycle  - background consumer worker: spawn, cancel, join
// - metrics    - Prometheus counters and the /metrics scrape server
//
// Delivery semantics are at-least-once: prefetch = 1, manual acknowledgment
// after the stock mutation commits, requeue on first failure, dead-letter
// after redelivery fails again.
//
// ============================================================================

pub mod config;
pub mod lifecycle;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod stock;
pub mod utils;

pub use config::Config;
pub use lifecycle::ConsumerHandle;
pub use messaging::{ConnectionManager, Dispatcher, EventPublisher};
pub use models::{StockAction, StockEvent, StockRecord, StockUpdate};
