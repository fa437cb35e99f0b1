//! Token-bucket rate limiter shared by all workers
//!
//! Backed by a direct (unkeyed) `governor` limiter: one cell is replenished
//! every `1 / rate` seconds and up to `capacity` cells can be spent at once.
//! Instantaneous bursts up to the capacity pass immediately and sustained
//! throughput converges to the refill rate.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Slowest replenish interval the bucket will use
const MAX_PERIOD: Duration = Duration::from_secs(3600);

/// Async token bucket with capacity `C` and refill rate `R` tokens/second
pub struct TokenBucket {
    capacity: NonZeroU32,
    limiter: DirectLimiter,
}

impl TokenBucket {
    /// Creates a full bucket
    ///
    /// `capacity` below 1 is raised to 1. The replenish period is clamped
    /// to between one nanosecond and one hour.
    pub fn new(rate: f64, capacity: u32) -> Self {
        let capacity = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);

        let period = Duration::try_from_secs_f64(1.0 / rate)
            .unwrap_or(MAX_PERIOD)
            .clamp(Duration::from_nanos(1), MAX_PERIOD);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(capacity);

        Self {
            capacity,
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Waits until `n` tokens are available, then debits them
    ///
    /// Requests larger than the capacity are clamped to the capacity, since
    /// they could never be satisfied otherwise.
    pub async fn acquire(&self, n: u32) {
        let needed = NonZeroU32::new(n.min(self.capacity.get())).unwrap_or(NonZeroU32::MIN);

        tracing::trace!(tokens = needed.get(), "Acquiring rate limiter tokens");
        if self.limiter.until_n_ready(needed).await.is_err() {
            // Unreachable after clamping; fall back to single cells
            for _ in 0..needed.get() {
                self.limiter.until_ready().await;
            }
        }
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_burst_then_wait() {
        let bucket = TokenBucket::new(2.0, 2);

        let started = Instant::now();
        bucket.acquire(1).await;
        bucket.acquire(1).await;
        assert!(started.elapsed() < Duration::from_millis(100));

        let before_third = Instant::now();
        bucket.acquire(1).await;
        assert!(before_third.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_oversized_request_is_clamped() {
        let bucket = TokenBucket::new(100.0, 2);
        let started = Instant::now();
        bucket.acquire(50).await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_concurrent_callers_do_not_double_spend() {
        let bucket = Arc::new(TokenBucket::new(10.0, 1));
        let started = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                tokio::spawn(async move { bucket.acquire(1).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // one immediate token, three more at 10/s
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_extreme_rates_do_not_panic() {
        let _ = TokenBucket::new(1e-20, 1);
        let _ = TokenBucket::new(1e12, 1);
        let _ = TokenBucket::new(5.0, 0);
    }
}
