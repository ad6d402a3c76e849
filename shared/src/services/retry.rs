use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::{MigrationError, MigrationResult};

const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Bounded exponential back-off with jitter, never sleeping past a deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(10);
        let backoff = self.base_delay.saturating_mul(1 << exponent).min(MAX_BACKOFF);
        let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2);
        backoff + Duration::from_millis(jitter_ms)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// runs out of attempts, or the next back-off would cross `deadline`.
    ///
    /// Returns the result together with the number of attempts made.
    pub async fn run<T, F, Fut>(&self, deadline: Instant, mut operation: F) -> (MigrationResult<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = MigrationResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let error: MigrationError = match operation(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= self.max_attempts {
                return (Err(error), attempt);
            }

            let delay = self.delay_for(attempt);
            if Instant::now() + delay >= deadline {
                tracing::warn!("Not retrying after attempt {}: deadline too close ({})", attempt, error);
                return (Err(error), attempt);
            }

            tracing::warn!(
                "Attempt {} of {} failed: {}; retrying in {:?}",
                attempt,
                self.max_attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
