use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection};

use super::connection::connection_properties;
use crate::models::StockEvent;

// ============================================================================
// Event Publisher
// ============================================================================
//
// Product-service side of the pipeline: after a product row is committed, the
// corresponding event is published here. A connection is opened and closed
// per call (no pooling), the queue declaration is idempotent, and the message
// is marked persistent so the broker keeps it across restarts.
//
// Fire-and-forget: no consumer acknowledgment is awaited. If publish fails
// after the business write committed, the event is lost; the caller's write
// is not rolled back.
//
// ============================================================================

/// Persistent delivery mode: the broker writes the message to disk.
const PERSISTENT: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize stock event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("broker transport error: {0}")]
    Transport(#[from] lapin::Error),
}

pub struct EventPublisher {
    addr: String,
    queue: String,
}

impl EventPublisher {
    pub fn new(addr: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            queue: queue.into(),
        }
    }

    pub async fn publish(&self, event: &StockEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;

        let connection = Connection::connect(&self.addr, connection_properties()).await?;
        let result = self.publish_on(&connection, &payload).await;

        // Close whether or not the publish went through. A close failure is
        // not a publish failure: if the message made it, it is on the broker.
        if let Err(error) = connection.close(200, "publish complete").await {
            tracing::warn!(error = %error, "error closing publisher connection");
        }

        result?;

        tracing::info!(
            product_id = event.product_id,
            action = event.action.as_str(),
            queue = %self.queue,
            "published stock event"
        );

        Ok(())
    }

    async fn publish_on(
        &self,
        connection: &Connection,
        payload: &[u8],
    ) -> Result<(), lapin::Error> {
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await?
            .await?;

        Ok(())
    }
}
