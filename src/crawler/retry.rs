//! Bounded exponential-backoff retry
//!
//! There is exactly one retry loop, [`retry_with_sleep`]. It is generic over
//! the operation and over how to wait between attempts, so async call sites
//! pass a cooperative sleep ([`retry`]) and blocking call sites pass a
//! thread sleep ([`retry_blocking`]).

use crate::config::RetryConfig;
use crate::FetchError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Classifies an error as transient (worth another attempt) or fatal
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        FetchError::is_retryable(self)
    }
}

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
        }
    }

    /// Delay before the retry following failed attempt `attempt` (0-based):
    /// `min(base_delay * backoff_factor^attempt, max_delay)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.base_delay.as_nanos() as f64 * self.backoff_factor.powi(exponent);

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Decides whether failed attempt `attempt` gets another try
    fn next_delay<E>(&self, operation: &str, attempt: u32, error: &E) -> Option<Duration>
    where
        E: Retryable + Display,
    {
        if !error.is_retryable() {
            tracing::debug!(operation, error = %error, "Non-retryable failure");
            return None;
        }

        if attempt >= self.max_retries {
            tracing::warn!(
                operation,
                attempts = attempt + 1,
                error = %error,
                "Giving up after retries"
            );
            return None;
        }

        let delay = self.delay_for(attempt);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after transient failure"
        );
        Some(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Runs `op` until it succeeds, fails fatally, or exhausts the policy,
/// awaiting `sleep(delay)` between attempts
pub async fn retry_with_sleep<T, E, Op, Fut, Sleep, SleepFut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: Op,
    mut sleep: Sleep,
) -> Result<T, E>
where
    E: Retryable + Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Sleep: FnMut(Duration) -> SleepFut,
    SleepFut: Future<Output = ()>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.next_delay(operation, attempt, &error) {
                Some(delay) => {
                    sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(error),
            },
        }
    }
}

/// Retry driver for async operations; suspends the task between attempts
pub async fn retry<T, E, Op, Fut>(policy: &RetryPolicy, operation: &str, op: Op) -> Result<T, E>
where
    E: Retryable + Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_sleep(policy, operation, op, tokio::time::sleep).await
}

/// Retry driver for blocking operations; sleeps the calling thread
pub fn retry_blocking<T, E, Op>(policy: &RetryPolicy, operation: &str, mut op: Op) -> Result<T, E>
where
    E: Retryable + Display,
    Op: FnMut() -> Result<T, E>,
{
    futures::executor::block_on(retry_with_sleep(
        policy,
        operation,
        || std::future::ready(op()),
        |delay| {
            std::thread::sleep(delay);
            std::future::ready(())
        },
    ))
}
