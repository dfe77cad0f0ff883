// ============================================================================
// Messaging Module
// ============================================================================
//
// Broker side of the pipeline:
// - connection - explicit connection manager with unbounded connect retry
// - publisher  - fire-and-forget persistent publish of stock events
// - consumer   - dispatcher: prefetch-1, manual-ack consume loop with
//                requeue/dead-letter handling and reconnect on drop
//
// ============================================================================

mod connection;
mod consumer;
mod publisher;

pub use connection::{connect_with, ConnectionManager};
pub use consumer::{ConsumeError, Dispatcher};
pub use publisher::{EventPublisher, PublishError};
