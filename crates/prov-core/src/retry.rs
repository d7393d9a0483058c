//! Bounded exponential backoff for downstream calls
//!
//! Only transient failures ([`DownstreamError::is_transient`]) are retried.
//! Permanent failures and the final transient failure are returned as-is.

use crate::error::DownstreamError;
use std::future::Future;
use std::time::Duration;

/// Retry policy for one downstream target
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after failed attempt `attempt` (1-based)
    ///
    /// `min(initial * multiplier^(attempt-1), max)`
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    ///
    /// # Errors
    /// Returns the last [`DownstreamError`] observed.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, DownstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DownstreamError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        target_service = err.target,
                        operation = err.operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient downstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        crate::config::RetryConfig::default().policy()
    }
}
