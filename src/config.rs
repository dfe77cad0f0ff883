use std::env;

// ============================================================================
// Configuration
// ============================================================================
//
// Everything comes from the environment with localhost-friendly defaults.
// DATABASE_URL wins when set; otherwise the URL is assembled from the
// individual POSTGRES_* variables.
//
// ============================================================================

pub const PRODUCT_QUEUE: &str = "product_queue";
pub const PRODUCT_DEAD_LETTER_QUEUE: &str = "product_queue.dlq";

#[derive(Debug, Clone)]
pub struct Config {
    pub rabbitmq_host: String,
    pub rabbitmq_port: u16,
    pub queue: String,
    pub dead_letter_queue: String,
    pub database_url: String,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let rabbitmq_host =
            env::var("RABBITMQ_HOST").unwrap_or_else(|_| "localhost".to_string());
        let rabbitmq_port = env::var("RABBITMQ_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5672);

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            let user = env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
            let password = env::var("POSTGRES_PASSWORD").unwrap_or_default();
            let host = env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
            let port = env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
            let db = env::var("POSTGRES_DB").unwrap_or_else(|_| "stock".to_string());
            format!("postgres://{user}:{password}@{host}:{port}/{db}")
        });

        let metrics_port = env::var("METRICS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9090);

        Self {
            rabbitmq_host,
            rabbitmq_port,
            queue: PRODUCT_QUEUE.to_string(),
            dead_letter_queue: PRODUCT_DEAD_LETTER_QUEUE.to_string(),
            database_url,
            metrics_port,
        }
    }

    /// AMQP URI for the broker, default vhost.
    pub fn amqp_addr(&self) -> String {
        format!("amqp://{}:{}/%2f", self.rabbitmq_host, self.rabbitmq_port)
    }
}
