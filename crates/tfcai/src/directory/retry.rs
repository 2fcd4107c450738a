//! bounded retry with exponential backoff
use super::DirectoryError;
use std::time::{Duration, Instant};

/// Budget per remote call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    timeout: Duration,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_CALL_TIMEOUT,
            Duration::from_millis(500),
            Duration::from_secs(10),
        )
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            timeout,
            base_delay,
            max_delay,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `operation` until it succeeds, fails permanently or the budget runs out
    ///
    /// The last retryable error is returned once the next delay would exceed the budget.
    pub fn run<T>(
        &self,
        mut operation: impl FnMut() -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let started = Instant::now();
        let mut backoff = Backoff::new(self.base_delay, self.max_delay);

        loop {
            let err = match operation() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            let delay = backoff.next_delay();
            if started.elapsed() + delay > self.timeout {
                tracing::debug!(%err, attempts = backoff.attempt, "retry budget exhausted");
                return Err(err);
            }

            tracing::debug!(%err, delay_ms = delay.as_millis() as u64, "retrying");
            std::thread::sleep(delay);
        }
    }
}

/// Exponential backoff, doubling from `base` up to `max`
struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}
