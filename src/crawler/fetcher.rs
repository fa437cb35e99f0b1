//! Resolver/fetcher
//!
//! Wraps a [`ProfileSource`] with the shared rate limiter and the retry
//! governor, and adds:
//! - a TTL cache for vanity name resolution
//! - comment pagination with per-page retry and item de-duplication
//! - best-effort friend list retrieval

use crate::config::Config;
use crate::crawler::rate_limiter::TokenBucket;
use crate::crawler::retry::{retry, RetryPolicy};
use crate::crawler::source::ProfileSource;
use crate::profile::{
    is_canonical_id, ContentExtractor, ContentItem, ProfileReference, SelectorExtractor,
};
use crate::{FetchError, FetchResult};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Vanity name to profile id cache with expiry checked on read
#[derive(Debug)]
pub struct ResolutionCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl ResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached id, evicting the entry if it has expired
    pub fn get(&self, reference: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        match entries.get(reference) {
            Some((id, fetched_at)) if fetched_at.elapsed() < self.ttl => Some(id.clone()),
            Some(_) => {
                entries.remove(reference);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, reference: &str, id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(reference.to_string(), (id.to_string(), Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rate-limited, retry-governed access to profiles
pub struct ProfileFetcher {
    source: Arc<dyn ProfileSource>,
    limiter: Arc<TokenBucket>,
    retry: RetryPolicy,
    cache: ResolutionCache,
    page_size: usize,
    extractor: Box<dyn ContentExtractor>,
}

impl ProfileFetcher {
    pub fn new(
        source: Arc<dyn ProfileSource>,
        limiter: Arc<TokenBucket>,
        retry: RetryPolicy,
        cache_ttl: Duration,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            limiter,
            retry,
            cache: ResolutionCache::new(cache_ttl),
            page_size: page_size.max(1),
            extractor: Box::new(SelectorExtractor::new()),
        }
    }

    /// Builds a fetcher with its own token bucket from configuration
    pub fn from_config(config: &Config, source: Arc<dyn ProfileSource>) -> Self {
        let limiter = Arc::new(TokenBucket::new(
            config.crawler.requests_per_second,
            config.crawler.burst_capacity,
        ));

        Self::new(
            source,
            limiter,
            RetryPolicy::from_config(&config.retry),
            Duration::from_secs(config.steam.resolve_cache_ttl_secs),
            config.crawler.comment_page_size as usize,
        )
    }

    /// Swaps the comment extractor
    pub fn with_extractor(mut self, extractor: Box<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Runs `call` under the retry policy, taking a rate limiter token
    /// before every attempt
    async fn limited<T, F, Fut>(&self, operation: &str, mut call: F) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let limiter = &self.limiter;
        retry(&self.retry, operation, || {
            let attempt = call();
            async move {
                limiter.acquire(1).await;
                attempt.await
            }
        })
        .await
    }

    /// Resolves a profile reference to a canonical id
    ///
    /// Canonical ids are returned unchanged without any network call.
    pub async fn resolve(&self, reference: &str) -> FetchResult<String> {
        let name = match ProfileReference::parse(reference)? {
            ProfileReference::SteamId(id) => return Ok(id),
            ProfileReference::Vanity(name) => name,
        };

        if let Some(id) = self.cache.get(&name) {
            tracing::trace!(vanity = %name, id = %id, "Resolution cache hit");
            return Ok(id);
        }

        let id = self
            .limited("resolve_vanity", || self.source.resolve_vanity(&name))
            .await?;

        if !is_canonical_id(&id) {
            return Err(FetchError::Malformed {
                url: "ResolveVanityURL".to_string(),
                message: format!("'{}' resolved to non-canonical id '{}'", name, id),
            });
        }

        self.cache.insert(&name, &id);
        tracing::debug!(vanity = %name, id = %id, "Resolved vanity name");
        Ok(id)
    }

    /// Fetches every comment on a profile
    ///
    /// A failure on the first page is returned; a failure on a later page
    /// keeps what was collected so far.
    pub async fn fetch_content(&self, node_id: &str) -> FetchResult<Vec<ContentItem>> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut start = 0usize;

        loop {
            let page = match self
                .limited("fetch_comment_page", || {
                    self.source.fetch_comment_page(node_id, start, self.page_size)
                })
                .await
            {
                Ok(page) => page,
                Err(e) if start == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        node_id,
                        start,
                        error = %e,
                        "Comment page failed; keeping earlier pages"
                    );
                    break;
                }
            };

            let extracted = self.extractor.extract(&page.html);
            let mut new_items = 0;
            for item in extracted.items {
                if seen.insert(item.clone()) {
                    items.push(item);
                    new_items += 1;
                }
            }

            tracing::trace!(
                node_id,
                start,
                containers = extracted.containers,
                new_items,
                "Fetched comment page"
            );

            start += self.page_size;

            if extracted.containers < self.page_size {
                break;
            }
            if page.total_count.map(|total| start >= total).unwrap_or(false) {
                break;
            }
            if new_items == 0 {
                tracing::debug!(node_id, start, "Full page with no new comments, stopping");
                break;
            }
        }

        Ok(items)
    }

    /// Fetches friend ids, degrading to an empty list on any failure
    pub async fn fetch_adjacency(&self, node_id: &str) -> Vec<String> {
        match self
            .limited("fetch_friends", || self.source.fetch_friends(node_id))
            .await
        {
            Ok(ids) => ids.into_iter().filter(|id| is_canonical_id(id)).collect(),
            Err(e) => {
                tracing::debug!(node_id, error = %e, "Friend list unavailable");
                Vec::new()
            }
        }
    }
}
