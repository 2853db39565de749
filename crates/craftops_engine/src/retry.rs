//! Bounded retry with exponential backoff for remote calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Retryable;

/// Backoff delays never grow past this multiple of the base delay.
const MAX_DELAY_FACTOR: u32 = 10;

/// How many times, and how patiently, a remote operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay to wait after the `retry`-th failure (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let cap = self.base_delay.saturating_mul(MAX_DELAY_FACTOR);
        self.base_delay
            .saturating_mul(1u32 << retry.min(16))
            .min(cap)
    }

    /// Runs `op` until it succeeds, fails terminally, or the retry budget is
    /// spent. `op` receives the zero-based attempt number.
    ///
    /// Only errors whose [`Retryable::is_retryable`] is true consume retry
    /// budget; anything else is returned straight away. Cancellation is
    /// checked before every attempt and interrupts backoff sleeps.
    pub async fn run<T, E, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(E::cancelled());
            }

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.max_retries {
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            warn!(
                attempt = attempt + 1,
                max_attempts = self.max_retries + 1,
                ?delay,
                error = %err,
                "Transient failure, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(E::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
