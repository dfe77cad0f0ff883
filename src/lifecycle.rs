use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::messaging::Dispatcher;

// ============================================================================
// Consumer Lifecycle
// ============================================================================
//
// Owns the background consumer: the cancellation token and the join handle
// live here, not in process-wide globals. The dispatcher runs on its own
// tokio task so broker I/O never sits on a request-serving path.
//
// ============================================================================

pub struct ConsumerHandle {
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Spawn the dispatcher's consume loop on a background task.
    pub fn start(dispatcher: Dispatcher) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let worker = tokio::spawn(async move {
            dispatcher.run(token).await;
        });

        tracing::info!("stock consumer worker started");
        Self { shutdown, worker }
    }

    /// Signal the consume loop to stop and wait for the worker to exit.
    /// Returns only after the task has fully finished; the dispatcher closes
    /// its broker connection on the way out, unblocking any pending receive.
    pub async fn shutdown(self) {
        tracing::info!("stopping stock consumer worker");
        self.shutdown.cancel();

        if let Err(error) = self.worker.await {
            tracing::error!(error = %error, "consumer worker terminated abnormally");
        } else {
            tracing::info!("stock consumer worker exited cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::ConnectionManager;
    use crate::metrics::Metrics;
    use crate::stock::testing::MemoryStockStore;
    use crate::stock::StockMutator;
    use std::sync::Arc;
    use std::time::Duration;

    fn unreachable_broker_dispatcher() -> Dispatcher {
        // Port 1 refuses immediately, so the worker sits in the connect-retry
        // loop until cancelled.
        Dispatcher::new(
            ConnectionManager::new("amqp://127.0.0.1:1/%2f"),
            "product_queue",
            "product_queue.dlq",
            StockMutator::new(Arc::new(MemoryStockStore::new())),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn shutdown_joins_the_worker() {
        let handle = ConsumerHandle::start(unreachable_broker_dispatcher());

        // Give the worker a moment to enter its loop, then stop it.
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown must return once the worker has exited");
    }

    #[tokio::test]
    async fn shutdown_before_first_connect_still_returns() {
        let handle = ConsumerHandle::start(unreachable_broker_dispatcher());

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown must not hang on a never-connected worker");
    }
}
