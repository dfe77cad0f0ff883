use std::future::Future;
use std::time::Duration;

use lapin::{Connection, ConnectionProperties};
use tokio::time::sleep;

// ============================================================================
// Broker Connection Manager
// ============================================================================
//
// Owns the dial parameters for the AMQP broker. connect() blocks and retries
// at a fixed interval until the broker accepts; it never surfaces an error to
// the caller. The consumer must eventually come up once the broker is
// reachable, with no cap on total wait.
//
// The manager is plain owned state held by whoever runs the consume loop.
// There is no process-global connection.
//
// ============================================================================

pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

pub struct ConnectionManager {
    addr: String,
}

impl ConnectionManager {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Dial the broker, retrying every 5 seconds until a connection is
    /// established.
    pub async fn connect(&self) -> Connection {
        let addr = self.addr.clone();
        connect_with(|| Connection::connect(&addr, connection_properties())).await
    }

    /// Close a connection obtained from this manager. Errors are logged, not
    /// propagated: at close time there is nothing useful left to do with them.
    pub async fn close(&self, connection: &Connection) {
        if let Err(error) = connection.close(200, "shutting down").await {
            tracing::warn!(error = %error, "error while closing broker connection");
        }
    }
}

/// Run `dial` until it produces a connection, sleeping the fixed retry
/// interval between failures. Generic over the dialer so the retry behavior
/// is testable without a broker.
pub async fn connect_with<F, Fut, C, E>(mut dial: F) -> C
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<C, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match dial().await {
            Ok(connection) => {
                if attempt > 1 {
                    tracing::info!(attempt, "broker connection established after retry");
                } else {
                    tracing::info!("broker connection established");
                }
                return connection;
            }
            Err(error) => {
                tracing::warn!(
                    attempt,
                    error = %error,
                    retry_in_secs = CONNECT_RETRY_INTERVAL.as_secs(),
                    "connection to broker failed, retrying"
                );
                sleep(CONNECT_RETRY_INTERVAL).await;
            }
        }
    }
}

pub(crate) fn connection_properties() -> ConnectionProperties {
    ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio)
}
