//! Crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Token-bucket rate limiting shared by all workers
//! - Bounded exponential-backoff retry
//! - The upstream profile source and the resolver/fetcher built on it
//! - The frontier with visited/queued de-duplication
//! - Overall crawl coordination and graceful shutdown

mod coordinator;
mod fetcher;
mod frontier;
mod rate_limiter;
mod retry;
mod source;

pub use coordinator::{crawl, Crawler, RunSummary};
pub use fetcher::{ProfileFetcher, ResolutionCache};
pub use frontier::{Claim, Frontier, InFlight};
pub use rate_limiter::TokenBucket;
pub use retry::{retry, retry_blocking, retry_with_sleep, RetryPolicy, Retryable};
pub use source::{build_http_client, CommentPage, ProfileSource, SteamSource, BROWSER_USER_AGENT};
