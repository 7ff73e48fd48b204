//! Retry policy: bounded attempts with exponential backoff.
//!
//! Wraps a fallible backend call. Retriable failures (see
//! [`ProviderError::is_retriable`]) are retried after a growing delay; a
//! non-retriable failure is surfaced on the spot. When the budget runs out
//! the last failure comes back wrapped in [`Error::RetriesExhausted`].
//!
//! An optional per-attempt timeout turns a hung call into a retriable
//! [`ProviderError::Timeout`].

use promptline_config::RetryConfig;
use promptline_core::error::{Error, ProviderError};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Retry settings shared by the dispatcher and the token estimator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create a policy with `max_retries` retries after the first attempt.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
            attempt_timeout: config.attempt_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Set the backoff schedule.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Bound each individual attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exp);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails for good, or the budget runs out.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            let outcome = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(format!(
                        "attempt {attempt} timed out after {}ms",
                        limit.as_millis()
                    ))),
                },
                None => op().await,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retriable() {
                warn!(attempt, error = %error, "Retry: non-retriable failure");
                return Err(Error::Provider(error));
            }

            if attempt >= attempts {
                warn!(attempts, error = %error, "Retry: attempts exhausted");
                return Err(Error::RetriesExhausted {
                    attempts,
                    source: error,
                });
            }

            let mut delay = self.backoff_for(attempt);
            if let ProviderError::RateLimited { retry_after_secs } = &error {
                delay = delay
                    .max(Duration::from_secs(*retry_after_secs))
                    .min(self.max_backoff);
            }

            info!(
                attempt,
                total = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retry: transient failure, backing off"
            );

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}
