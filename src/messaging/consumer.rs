use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection};
use tokio_util::sync::CancellationToken;

use super::connection::ConnectionManager;
use crate::metrics::Metrics;
use crate::models::{StockAction, StockEvent};
use crate::stock::StockMutator;

// ============================================================================
// Message Dispatcher
// ============================================================================
//
// Consume loop over the durable product queue:
//
// 1. prefetch = 1: never more than one unacknowledged message per dispatcher,
//    which caps concurrent mutation of stock rows without per-product locks;
// 2. manual ack: a message leaves the queue only after the stock mutation
//    committed;
// 3. handler errors never kill the loop. A fresh delivery that fails is
//    negative-acknowledged with requeue; a redelivered one that fails again
//    goes to the dead-letter queue. Undecodable payloads are dead-lettered
//    immediately, they will not get better on redelivery;
// 4. the receive wait is sliced (1 s) so a stop signal is observed promptly
//    on an idle queue;
// 5. a connection drop mid-consumption re-enters the connect-retry state.
//
// ============================================================================

const CONSUMER_TAG: &str = "stock-sync-dispatcher";
const RECEIVE_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("broker transport error: {0}")]
    Transport(#[from] lapin::Error),

    #[error("delivery stream closed by broker")]
    StreamClosed,
}

/// What to do with a delivery once its handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Ack,
    Requeue,
    DeadLetter,
}

pub struct Dispatcher {
    manager: ConnectionManager,
    queue: String,
    dead_letter_queue: String,
    mutator: StockMutator,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        manager: ConnectionManager,
        queue: impl Into<String>,
        dead_letter_queue: impl Into<String>,
        mutator: StockMutator,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            manager,
            queue: queue.into(),
            dead_letter_queue: dead_letter_queue.into(),
            mutator,
            metrics,
        }
    }

    /// Run until `shutdown` fires. Each pass connects (retrying forever),
    /// consumes until the connection drops or shutdown is requested, and
    /// reconnects on drop.
    pub async fn run(&self, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            let connection = tokio::select! {
                connection = self.manager.connect() => connection,
                () = shutdown.cancelled() => break,
            };
            self.metrics.broker_connections.inc();

            match self.consume(&connection, &shutdown).await {
                Ok(()) => {
                    // Stop requested; close to unblock anything still pending.
                    self.manager.close(&connection).await;
                    break;
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        "consume loop ended unexpectedly, reconnecting"
                    );
                    self.metrics.broker_reconnects.inc();
                    self.manager.close(&connection).await;
                }
            }
        }

        tracing::info!("dispatcher stopped");
    }

    /// Consume deliveries until cancellation (Ok) or transport failure (Err).
    async fn consume(
        &self,
        connection: &Connection,
        shutdown: &CancellationToken,
    ) -> Result<(), ConsumeError> {
        let channel = connection.create_channel().await?;

        let durable = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        channel
            .queue_declare(&self.queue, durable, FieldTable::default())
            .await?;
        channel
            .queue_declare(&self.dead_letter_queue, durable, FieldTable::default())
            .await?;

        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let mut consumer = channel
            .basic_consume(
                &self.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue = %self.queue, "consuming stock events");

        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                next = tokio::time::timeout(RECEIVE_SLICE, consumer.next()) => next,
            };

            let delivery = match next {
                // Slice elapsed with no delivery; loop around so the stop
                // flag is observed.
                Err(_) => continue,
                Ok(None) => return Err(ConsumeError::StreamClosed),
                Ok(Some(Err(error))) => return Err(error.into()),
                Ok(Some(Ok(delivery))) => delivery,
            };

            let disposition = self
                .dispatch(&delivery.data, delivery.redelivered)
                .await;
            self.settle(&channel, delivery, disposition).await?;
        }
    }

    /// Decode and handle one delivery, deciding its fate. Never panics and
    /// never returns an error: a failed handler becomes a Requeue or
    /// DeadLetter disposition instead of crashing the loop.
    async fn dispatch(&self, payload: &[u8], redelivered: bool) -> Disposition {
        let event: StockEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(
                    error = %error,
                    payload_len = payload.len(),
                    "undecodable stock event, dead-lettering"
                );
                self.metrics.events_dead_lettered.inc();
                return Disposition::DeadLetter;
            }
        };

        let result = match event.action {
            StockAction::Create => self.mutator.create_stock_record(event.product_id).await,
            StockAction::Delete => self.mutator.delete_stock_record(event.product_id).await,
        };

        match result {
            Ok(()) => {
                self.metrics
                    .events_processed
                    .with_label_values(&[event.action.as_str()])
                    .inc();
                Disposition::Ack
            }
            Err(error) if redelivered => {
                tracing::error!(
                    error = %error,
                    product_id = event.product_id,
                    action = event.action.as_str(),
                    "mutation failed again on redelivery, dead-lettering"
                );
                self.metrics.events_dead_lettered.inc();
                Disposition::DeadLetter
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    product_id = event.product_id,
                    action = event.action.as_str(),
                    "mutation failed, requeueing for redelivery"
                );
                self.metrics.events_requeued.inc();
                Disposition::Requeue
            }
        }
    }

    async fn settle(
        &self,
        channel: &Channel,
        delivery: lapin::message::Delivery,
        disposition: Disposition,
    ) -> Result<(), ConsumeError> {
        match disposition {
            Disposition::Ack => {
                delivery.ack(BasicAckOptions::default()).await?;
            }
            Disposition::Requeue => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await?;
            }
            Disposition::DeadLetter => {
                channel
                    .basic_publish(
                        "",
                        &self.dead_letter_queue,
                        BasicPublishOptions::default(),
                        &delivery.data,
                        BasicProperties::default().with_delivery_mode(2),
                    )
                    .await?
                    .await?;
                // The copy is safely parked; drop the original.
                delivery.ack(BasicAckOptions::default()).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::testing::{FlakyStockStore, MemoryStockStore};
    use crate::stock::StockStore;

    fn dispatcher_over(store: Arc<dyn StockStore>) -> Dispatcher {
        Dispatcher::new(
            ConnectionManager::new("amqp://127.0.0.1:1/%2f"),
            "product_queue",
            "product_queue.dlq",
            StockMutator::new(store),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn delete_action_routes_to_the_delete_path() {
        let store = Arc::new(MemoryStockStore::new());
        store.create_stock(7).await.unwrap();
        let dispatcher = dispatcher_over(store.clone());

        let disposition = dispatcher
            .dispatch(br#"{"product_id": 7, "action": "delete"}"#, false)
            .await;

        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(store.row_count().await, 0);
    }

    #[tokio::test]
    async fn absent_action_routes_to_the_create_path() {
        let store = Arc::new(MemoryStockStore::new());
        let dispatcher = dispatcher_over(store.clone());

        let disposition = dispatcher.dispatch(br#"{"product_id": 7}"#, false).await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(store
            .find_stock_by_product_id(7)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn repeated_create_deliveries_leave_exactly_one_row() {
        let store = Arc::new(MemoryStockStore::new());
        let dispatcher = dispatcher_over(store.clone());

        for _ in 0..3 {
            let disposition = dispatcher
                .dispatch(br#"{"product_id": 11, "action": "create"}"#, false)
                .await;
            assert_eq!(disposition, Disposition::Ack);
        }

        assert_eq!(store.row_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_requeues_instead_of_acking() {
        let store = Arc::new(FlakyStockStore::failing(u32::MAX));
        let dispatcher = dispatcher_over(store);

        let disposition = dispatcher.dispatch(br#"{"product_id": 5}"#, false).await;

        assert_eq!(disposition, Disposition::Requeue);
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_on_redelivery_dead_letters() {
        let store = Arc::new(FlakyStockStore::failing(u32::MAX));
        let dispatcher = dispatcher_over(store);

        let disposition = dispatcher.dispatch(br#"{"product_id": 5}"#, true).await;

        assert_eq!(disposition, Disposition::DeadLetter);
    }

    #[tokio::test]
    async fn undecodable_payload_dead_letters_without_touching_storage() {
        let store = Arc::new(MemoryStockStore::new());
        let dispatcher = dispatcher_over(store.clone());

        assert_eq!(
            dispatcher.dispatch(b"not json at all", false).await,
            Disposition::DeadLetter
        );
        assert_eq!(
            dispatcher.dispatch(br#"{"action": "create"}"#, false).await,
            Disposition::DeadLetter
        );
        assert_eq!(store.row_count().await, 0);
    }
}
