mod server;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics - Prometheus counters for the sync pipeline
// ============================================================================
//
// Tracks what the pipeline is doing:
// - events processed per action (create/delete)
// - deliveries requeued and dead-lettered
// - broker connections established and reconnects after a drop
//
// Scraped via the /metrics endpoint started from main.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub events_processed: IntCounterVec,
    pub events_requeued: IntCounter,
    pub events_dead_lettered: IntCounter,
    pub broker_connections: IntCounter,
    pub broker_reconnects: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_processed = IntCounterVec::new(
            Opts::new(
                "stock_events_processed_total",
                "Stock events handled and acknowledged",
            ),
            &["action"],
        )?;
        registry.register(Box::new(events_processed.clone()))?;

        let events_requeued = IntCounter::new(
            "stock_events_requeued_total",
            "Deliveries negative-acknowledged back onto the queue",
        )?;
        registry.register(Box::new(events_requeued.clone()))?;

        let events_dead_lettered = IntCounter::new(
            "stock_events_dead_lettered_total",
            "Deliveries parked on the dead-letter queue",
        )?;
        registry.register(Box::new(events_dead_lettered.clone()))?;

        let broker_connections = IntCounter::new(
            "broker_connections_total",
            "Broker connections successfully established",
        )?;
        registry.register(Box::new(broker_connections.clone()))?;

        let broker_reconnects = IntCounter::new(
            "broker_reconnects_total",
            "Reconnect cycles entered after a mid-stream connection drop",
        )?;
        registry.register(Box::new(broker_reconnects.clone()))?;

        Ok(Self {
            registry,
            events_processed,
            events_requeued,
            events_dead_lettered,
            broker_connections,
            broker_reconnects,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
