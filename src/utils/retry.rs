use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Bounded Retry with Exponential Backoff
// ============================================================================
//
// Used for per-message storage mutations: a delivery gets a few in-process
// attempts before the dispatcher gives up and lets the queue-level policy
// (requeue, then dead-letter) take over. The unbounded broker connect loop
// lives in messaging::connection, not here.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy for stock mutations: short delays, a handful of attempts.
    /// Anything still failing after this is the broker's problem to redeliver.
    pub fn mutation() -> Self {
        Self::default()
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = Duration::from_millis(
            ((current.as_millis() as f64) * self.multiplier) as u64,
        );
        scaled.min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are exhausted,
/// returning the last error in that case.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, what: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, what, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        attempt,
                        error = %error,
                        what,
                        "operation failed after all retries"
                    );
                    return Err(error);
                }

                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %error,
                    what,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying after delay"
                );
                sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        }
    }
}
