use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stock_sync::lifecycle::ConsumerHandle;
use stock_sync::messaging::{ConnectionManager, Dispatcher};
use stock_sync::metrics::{start_metrics_server, Metrics};
use stock_sync::stock::{PgStockRepository, StockMutator};
use stock_sync::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering.
    // Default to INFO, override with RUST_LOG (e.g. RUST_LOG=debug).
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stock_sync=debug")),
        )
        .init();

    tracing::info!("starting stock-sync consumer service");

    let config = Config::from_env();

    // === 1. Storage ===
    tracing::info!("connecting to Postgres");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let repository = Arc::new(PgStockRepository::new(pool));
    repository.ensure_schema().await?;

    // === 2. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    let registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime.block_on(async {
            if let Err(error) = start_metrics_server(registry, metrics_port).await {
                tracing::error!(error = %error, "metrics server error");
            }
        }),
        Err(error) => tracing::error!(error = %error, "failed to build metrics runtime"),
    });

    // === 3. Consumer ===
    let manager = ConnectionManager::new(config.amqp_addr());
    let mutator = StockMutator::new(repository);
    let dispatcher = Dispatcher::new(
        manager,
        config.queue.clone(),
        config.dead_letter_queue.clone(),
        mutator,
        metrics,
    );
    let consumer = ConsumerHandle::start(dispatcher);

    tracing::info!(
        queue = %config.queue,
        broker = %config.amqp_addr(),
        "stock consumer running, press ctrl-c to stop"
    );

    // === 4. Shutdown ===
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    consumer.shutdown().await;
    tracing::info!("stock-sync stopped cleanly");

    Ok(())
}
