//! Crawl coordinator - the crawl engine
//!
//! This module owns one crawl run end to end:
//! - resolving the seed and seeding the frontier
//! - running `max_concurrent_requests` workers that pull, fetch, filter,
//!   persist and expand
//! - watching the wall-clock threshold while workers run
//! - draining the frontier into an unprocessed snapshot on early shutdown

use crate::config::Config;
use crate::crawler::fetcher::ProfileFetcher;
use crate::crawler::frontier::{Claim, Frontier};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::source::{ProfileSource, SteamSource};
use crate::filter::ContentFilter;
use crate::state::{FrontierItem, RunPhase, RunState, ShutdownReason, ThresholdPolicy};
use crate::storage::{FlaggedItem, PersistenceGateway, SqliteStorage};
use crate::Result;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// How often the orchestrator checks the wall-clock threshold
const THRESHOLD_TICK: Duration = Duration::from_secs(1);

/// Outcome of one crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Canonical id the seed resolved to
    pub seed_id: String,

    /// Profiles processed (equals the size of the visited set)
    pub processed_count: usize,

    /// `None` when the frontier emptied on its own
    pub shutdown_reason: Option<ShutdownReason>,

    /// Flagged items newly stored during this run
    pub flagged_count: usize,

    /// Unprocessed frontier records stored for a later resume
    pub unprocessed_saved: usize,
}

impl RunSummary {
    pub fn exit_reason(&self) -> &'static str {
        ShutdownReason::exit_reason(self.shutdown_reason)
    }

    pub fn completed_normally(&self) -> bool {
        self.shutdown_reason.is_none()
    }
}

/// Long-lived crawl engine
///
/// The fetcher (and its resolution cache) outlives individual runs; each
/// call to [`Crawler::crawl`] gets a fresh frontier and run state.
pub struct Crawler {
    config: Config,
    fetcher: Arc<ProfileFetcher>,
    filter: Arc<ContentFilter>,
    gateway: Arc<PersistenceGateway>,
    policy: ThresholdPolicy,
}

impl Crawler {
    pub fn new(
        config: Config,
        source: Arc<dyn ProfileSource>,
        gateway: Arc<PersistenceGateway>,
    ) -> Result<Self> {
        let filter = ContentFilter::from_config(&config.filter)?;
        let fetcher = ProfileFetcher::from_config(&config, source);

        tracing::debug!(
            terms = filter.term_count(),
            patterns = filter.pattern_count(),
            workers = config.crawler.max_concurrent_requests,
            "Crawler initialized"
        );

        Ok(Self {
            policy: ThresholdPolicy::from_config(&config.crawler),
            config,
            fetcher: Arc::new(fetcher),
            filter: Arc::new(filter),
            gateway,
        })
    }

    /// Replaces the thresholds taken from configuration
    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds a crawler against the live Steam endpoints and the configured
    /// SQLite database
    pub fn from_config(config: Config) -> Result<Self> {
        let source = Arc::new(SteamSource::new(&config.steam)?);
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let gateway = Arc::new(PersistenceGateway::new(
            Box::new(storage),
            RetryPolicy::from_config(&config.retry),
        ));

        Self::new(config, source, gateway)
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    /// Crawls outward from `seed` until the frontier is empty or a
    /// threshold is reached
    ///
    /// Only a failure to resolve the seed is returned as an error.
    pub async fn crawl(&self, seed: &str) -> Result<RunSummary> {
        let run = Arc::new(RunState::new());

        let seed_id = self.fetcher.resolve(seed).await.map_err(|e| {
            tracing::error!(seed, error = %e, "Failed to resolve seed");
            e
        })?;
        tracing::info!(seed, seed_id = %seed_id, "Starting crawl");

        let ctx = Arc::new(RunContext {
            fetcher: Arc::clone(&self.fetcher),
            filter: Arc::clone(&self.filter),
            gateway: Arc::clone(&self.gateway),
            frontier: Frontier::new(),
            policy: self.policy,
            stop: run.shutdown_token().child_token(),
            run: Arc::clone(&run),
            queue_timeout: self.config.crawler.queue_timeout(),
            flagged: AtomicUsize::new(0),
        });
        ctx.frontier.enqueue_if_new(FrontierItem::seed(&seed_id));

        run.transition(RunPhase::Running)?;

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.crawler.max_concurrent_requests.max(1) {
            workers.spawn(worker_loop(Arc::clone(&ctx), worker_id));
        }

        self.watch(&ctx, &mut workers).await;

        ctx.stop.cancel();
        while let Some(joined) = workers.join_next().await {
            log_worker_exit(joined);
        }

        let shutdown_reason = run.shutdown_reason();
        let mut unprocessed_saved = 0;

        if let Some(reason) = shutdown_reason {
            run.transition(RunPhase::Draining)?;
            let remaining = ctx.frontier.drain();
            tracing::info!(
                remaining = remaining.len(),
                reason = %reason,
                "Draining frontier"
            );
            if !remaining.is_empty() {
                unprocessed_saved = ctx.gateway.save_unprocessed_frontier(&remaining, reason);
            }
        }

        run.transition(RunPhase::Terminated)?;

        let summary = RunSummary {
            seed_id,
            processed_count: ctx.frontier.visited_count(),
            shutdown_reason,
            flagged_count: ctx.flagged.load(Ordering::SeqCst),
            unprocessed_saved,
        };

        tracing::info!(
            processed = summary.processed_count,
            flagged = summary.flagged_count,
            unprocessed = summary.unprocessed_saved,
            elapsed = ?run.elapsed(),
            "Crawl finished: {}",
            summary.exit_reason()
        );

        Ok(summary)
    }

    /// Returns when the frontier is exhausted, shutdown was requested or
    /// every worker has exited, requesting shutdown itself when the time
    /// limit passes
    async fn watch(&self, ctx: &RunContext, workers: &mut JoinSet<()>) {
        let mut ticker = tokio::time::interval(THRESHOLD_TICK);

        loop {
            tokio::select! {
                _ = ctx.frontier.wait_exhausted() => break,
                _ = ctx.run.shutdown_token().cancelled() => break,
                joined = workers.join_next() => match joined {
                    Some(joined) => log_worker_exit(joined),
                    None => {
                        if !ctx.frontier.is_exhausted() {
                            tracing::error!("All workers exited with profiles still queued");
                        }
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if ctx.policy.time_limit_reached(ctx.run.elapsed()) {
                        ctx.run.request_shutdown(ShutdownReason::TimeLimit);
                    }
                }
            }
        }
    }
}

/// State shared by the workers of one run
struct RunContext {
    fetcher: Arc<ProfileFetcher>,
    filter: Arc<ContentFilter>,
    gateway: Arc<PersistenceGateway>,
    frontier: Frontier,
    policy: ThresholdPolicy,
    run: Arc<RunState>,

    /// Cancelled on shutdown and when the orchestrator is done
    stop: CancellationToken,

    queue_timeout: Duration,
    flagged: AtomicUsize,
}

async fn worker_loop(ctx: Arc<RunContext>, worker_id: u32) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let pulled = tokio::select! {
            _ = ctx.stop.cancelled() => break,
            pulled = ctx.frontier.pull(ctx.queue_timeout) => pulled,
        };

        let Some(item) = pulled else {
            if ctx.frontier.is_exhausted() {
                break;
            }
            continue;
        };
        let _in_flight = ctx.frontier.in_flight();

        match ctx
            .frontier
            .claim(&item, &ctx.policy, ctx.run.elapsed())
        {
            Claim::Proceed => {}
            Claim::Duplicate => continue,
            Claim::Breached(reason) => {
                ctx.run.request_shutdown(reason);
                break;
            }
        }

        let processed = tokio::select! {
            _ = ctx.stop.cancelled() => {
                tracing::debug!(worker_id, node_id = %item.node_id, "Dropping in-flight profile");
                break;
            }
            processed = AssertUnwindSafe(process_node(&ctx, &item)).catch_unwind() => processed,
        };

        if let Err(panic) = processed {
            tracing::error!(
                worker_id,
                node_id = %item.node_id,
                "Profile processing panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

fn log_worker_exit(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Worker task failed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Fetches, filters, persists and expands one profile
async fn process_node(ctx: &RunContext, item: &FrontierItem) {
    tracing::info!(node_id = %item.node_id, depth = item.depth, "Processing profile");

    let content = match ctx.fetcher.fetch_content(&item.node_id).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(node_id = %item.node_id, error = %e, "Failed to fetch comments");
            Vec::new()
        }
    };

    let mut batch = Vec::new();
    let mut staged: Vec<FrontierItem> = Vec::new();

    for content_item in content.iter().filter(|c| ctx.filter.is_flagged(&c.text)) {
        let actor_id = match ctx.fetcher.resolve(&content_item.author_reference).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    author = %content_item.author_reference,
                    error = %e,
                    "Skipping flagged comment with unresolvable author"
                );
                continue;
            }
        };

        if !ctx.frontier.is_known(&actor_id) && !staged.iter().any(|s| s.node_id == actor_id) {
            staged.push(item.child(actor_id.clone()));
        }

        batch.push(FlaggedItem {
            actor_id,
            actor_alias: content_item.author_alias.clone(),
            subject_node_id: item.node_id.clone(),
            content_text: content_item.text.clone(),
            content_timestamp: content_item.timestamp,
            discovery_path: item.path_string(),
        });
    }

    if !batch.is_empty() {
        tracing::info!(
            node_id = %item.node_id,
            flagged = batch.len(),
            "Found flagged comments"
        );

        let persisted = ctx.gateway.try_insert_flagged_items_batch(&batch);

        for flagged in &batch {
            ctx.gateway
                .upsert_actor(&flagged.actor_id, &flagged.actor_alias);
        }

        match persisted {
            Some(inserted) => {
                ctx.flagged.fetch_add(inserted, Ordering::SeqCst);
                for next in staged {
                    ctx.frontier.enqueue_if_new(next);
                }
            }
            None => {
                tracing::warn!(
                    node_id = %item.node_id,
                    staged = staged.len(),
                    "Not expanding from comments that failed to persist"
                );
            }
        }
    }

    let neighbors = ctx.fetcher.fetch_adjacency(&item.node_id).await;
    let mut enqueued = 0;
    for neighbor in neighbors {
        if ctx.frontier.enqueue_if_new(item.child(neighbor)) {
            enqueued += 1;
        }
    }

    tracing::debug!(node_id = %item.node_id, enqueued, "Expanded friends");
}

/// Convenience entry point: builds a [`Crawler`] from configuration and
/// crawls one seed
pub async fn crawl(config: Config, seed: &str) -> Result<RunSummary> {
    Crawler::from_config(config)?.crawl(seed).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CrawlerConfig, FilterConfig, OutputConfig, RetryConfig, SteamConfig, TargetsConfig,
    };
    use crate::crawler::source::CommentPage;
    use crate::storage::{SqliteStorage, Storage};
    use crate::{FetchError, FetchResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-process graph of profiles
    #[derive(Default)]
    struct GraphSource {
        comments: HashMap<String, String>,
        friends: HashMap<String, Vec<String>>,
        vanity: HashMap<String, String>,
        fetched: Mutex<Vec<String>>,

        /// Comment fetches for this node panic
        panic_on: Option<String>,

        /// Comment fetches for this node never finish in test time
        stall_on: Option<String>,
    }

    impl GraphSource {
        fn with_friends(mut self, node: &str, friends: &[&str]) -> Self {
            self.friends.insert(
                node.to_string(),
                friends.iter().map(|f| f.to_string()).collect(),
            );
            self
        }

        fn with_comment(mut self, node: &str, author_path: &str, text: &str) -> Self {
            let html = format!(
                r#"<div class="commentthread_comment">
                    <a class="commentthread_author_link" href="https://steamcommunity.com{author_path}">Author</a>
                    <div class="commentthread_comment_text">{text}</div>
                </div>"#
            );
            self.comments.entry(node.to_string()).or_default().push_str(&html);
            self
        }

        fn with_vanity(mut self, name: &str, id: &str) -> Self {
            self.vanity.insert(name.to_string(), id.to_string());
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProfileSource for GraphSource {
        async fn resolve_vanity(&self, name: &str) -> FetchResult<String> {
            self.vanity
                .get(name)
                .cloned()
                .ok_or_else(|| FetchError::Resolution {
                    reference: name.to_string(),
                })
        }

        async fn fetch_comment_page(
            &self,
            node_id: &str,
            start: usize,
            _count: usize,
        ) -> FetchResult<CommentPage> {
            if start == 0 {
                self.fetched.lock().unwrap().push(node_id.to_string());
            }
            if self.panic_on.as_deref() == Some(node_id) {
                panic!("malformed profile {}", node_id);
            }
            if self.stall_on.as_deref() == Some(node_id) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let html = if start == 0 {
                self.comments.get(node_id).cloned().unwrap_or_default()
            } else {
                String::new()
            };
            Ok(CommentPage {
                html,
                total_count: None,
            })
        }

        async fn fetch_friends(&self, node_id: &str) -> FetchResult<Vec<String>> {
            Ok(self.friends.get(node_id).cloned().unwrap_or_default())
        }
    }

    const SEED: &str = "76561198000000001";
    const N2: &str = "76561198000000002";
    const N3: &str = "76561198000000003";
    const N4: &str = "76561198000000004";

    fn test_config(workers: u32, max_profiles: u64) -> Config {
        Config {
            crawler: CrawlerConfig {
                max_concurrent_requests: workers,
                requests_per_second: 1000.0,
                burst_capacity: 100,
                max_profiles_to_process: max_profiles,
                max_processing_time_minutes: 0,
                queue_timeout_secs: 1,
                comment_page_size: 50,
            },
            retry: RetryConfig {
                max_retries: 1,
                base_delay_ms: 1,
                max_delay_ms: 5,
                backoff_factor: 2.0,
            },
            steam: SteamConfig {
                api_key: "KEY".to_string(),
                api_base: "http://127.0.0.1:1".to_string(),
                community_base: "http://127.0.0.1:1".to_string(),
                resolve_cache_ttl_secs: 3600,
                request_timeout_secs: 1,
                connect_timeout_secs: 1,
                max_connections_per_host: 1,
            },
            filter: FilterConfig {
                terms: vec!["t1".to_string()],
                patterns: vec![],
            },
            output: OutputConfig {
                database_path: ":memory:".to_string(),
            },
            targets: TargetsConfig::default(),
        }
    }

    fn crawler(config: Config, source: Arc<GraphSource>) -> Crawler {
        let gateway = Arc::new(PersistenceGateway::new(
            Box::new(SqliteStorage::new_in_memory().unwrap()),
            RetryPolicy::from_config(&config.retry),
        ));
        Crawler::new(config, source, gateway).unwrap()
    }

    #[tokio::test]
    async fn test_lonely_seed_completes_normally() {
        let source = Arc::new(GraphSource::default());
        let crawler = crawler(test_config(3, 0), Arc::clone(&source));

        let summary = crawler.crawl(SEED).await.unwrap();

        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.shutdown_reason, None);
        assert_eq!(summary.flagged_count, 0);
        assert_eq!(summary.unprocessed_saved, 0);
        assert_eq!(crawler.gateway().count_unprocessed(), 0);
        assert_eq!(summary.exit_reason(), "queue cleared");
    }

    #[tokio::test]
    async fn test_profile_limit_snapshots_neighbors() {
        let source = Arc::new(GraphSource::default().with_friends(SEED, &[N2, N3]));
        let crawler = crawler(test_config(2, 1), Arc::clone(&source));

        let summary = crawler.crawl(SEED).await.unwrap();

        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.shutdown_reason, Some(ShutdownReason::ProfileLimit));
        assert_eq!(summary.unprocessed_saved, 2);
        assert_eq!(source.fetched(), vec![SEED.to_string()]);
        assert_eq!(crawler.gateway().count_unprocessed(), 2);
    }

    #[tokio::test]
    async fn test_flagged_author_is_persisted_and_crawled() {
        let source = Arc::new(
            GraphSource::default()
                .with_comment(SEED, "/id/villain", "this says T1 loudly")
                .with_comment(SEED, "/profiles/76561198000000003", "a friendly note")
                .with_vanity("villain", N2),
        );
        let crawler = crawler(test_config(2, 0), Arc::clone(&source));

        let summary = crawler.crawl(SEED).await.unwrap();

        assert_eq!(summary.flagged_count, 1);
        assert_eq!(summary.processed_count, 2);

        let mut fetched = source.fetched();
        fetched.sort();
        assert_eq!(fetched, vec![SEED.to_string(), N2.to_string()]);
    }

    #[tokio::test]
    async fn test_unresolvable_author_is_skipped() {
        let source = Arc::new(
            GraphSource::default().with_comment(SEED, "/id/ghost", "t1 t1 t1"),
        );
        let crawler = crawler(test_config(1, 0), Arc::clone(&source));

        let summary = crawler.crawl(SEED).await.unwrap();

        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.flagged_count, 0);
        assert_eq!(summary.shutdown_reason, None);
    }

    #[tokio::test]
    async fn test_cycles_are_visited_once() {
        let source = Arc::new(
            GraphSource::default()
                .with_friends(SEED, &[N2, N3])
                .with_friends(N2, &[SEED, N3, N4])
                .with_friends(N3, &[SEED, N2, N4])
                .with_friends(N4, &[SEED, N2]),
        );
        let crawler = crawler(test_config(4, 0), Arc::clone(&source));

        let summary = crawler.crawl(SEED).await.unwrap();

        assert_eq!(summary.processed_count, 4);
        let mut fetched = source.fetched();
        fetched.sort();
        fetched.dedup();
        assert_eq!(fetched.len(), 4);
        assert_eq!(source.fetched().len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_seed_is_fatal() {
        let source = Arc::new(GraphSource::default());
        let crawler = crawler(test_config(1, 0), source);

        let result = crawler.crawl("https://steamcommunity.com/id/nobody").await;
        assert!(matches!(
            result,
            Err(crate::SentinelError::Fetch(FetchError::Resolution { .. }))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_flag_across_runs_is_not_recounted() {
        let source = Arc::new(
            GraphSource::default()
                .with_comment(SEED, "/profiles/76561198000000002", "t1")
                .with_friends(SEED, &[]),
        );
        let crawler = crawler(test_config(1, 1), Arc::clone(&source));

        let first = crawler.crawl(SEED).await.unwrap();
        let second = crawler.crawl(SEED).await.unwrap();

        assert_eq!(first.flagged_count, 1);
        assert_eq!(second.flagged_count, 0);
        assert_eq!(crawler.gateway().count_flagged_items(), 1);

        // the actor was staged in both runs but never processed
        assert_eq!(first.shutdown_reason, Some(ShutdownReason::ProfileLimit));
        assert_eq!(crawler.gateway().count_unprocessed(), 1);
    }

    #[tokio::test]
    async fn test_panicking_profile_does_not_hang_run() {
        let source = Arc::new(GraphSource {
            panic_on: Some(N2.to_string()),
            ..GraphSource::default().with_friends(SEED, &[N2, N3])
        });
        let crawler = crawler(test_config(1, 0), Arc::clone(&source));

        let summary = tokio::time::timeout(Duration::from_secs(10), crawler.crawl(SEED))
            .await
            .expect("crawl should finish after a panicking profile")
            .unwrap();

        assert_eq!(summary.shutdown_reason, None);
        assert_eq!(summary.processed_count, 3);

        let mut fetched = source.fetched();
        fetched.sort();
        assert_eq!(fetched, vec![SEED.to_string(), N2.to_string(), N3.to_string()]);
    }

    #[tokio::test]
    async fn test_time_limit_drains_frontier() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sentinel.db");

        let source = Arc::new(GraphSource {
            stall_on: Some(N2.to_string()),
            ..GraphSource::default().with_friends(SEED, &[N2, N3])
        });
        let config = test_config(1, 0);
        let gateway = Arc::new(PersistenceGateway::new(
            Box::new(SqliteStorage::new(&db_path).unwrap()),
            RetryPolicy::from_config(&config.retry),
        ));
        let crawler = Crawler::new(config, source, gateway)
            .unwrap()
            .with_policy(ThresholdPolicy {
                max_profiles: 0,
                max_duration: Some(Duration::from_millis(200)),
            });

        let summary = tokio::time::timeout(Duration::from_secs(10), crawler.crawl(SEED))
            .await
            .expect("time limit should stop the run")
            .unwrap();

        // The seed finished; its stalled neighbour was dropped in flight
        assert_eq!(summary.shutdown_reason, Some(ShutdownReason::TimeLimit));
        assert_eq!(summary.exit_reason(), "runtime threshold reached");
        assert_eq!(summary.processed_count, 2);
        assert_eq!(summary.unprocessed_saved, 1);

        let storage = SqliteStorage::new(&db_path).unwrap();
        let saved = storage.list_unprocessed(10).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].node_id, N3);
        assert_eq!(saved[0].reason, Some(ShutdownReason::TimeLimit));
        assert_eq!(
            storage.latest_shutdown_reason().unwrap(),
            Some(ShutdownReason::TimeLimit)
        );
    }

    #[test]
    fn test_summary_exit_reason() {
        let summary = RunSummary {
            seed_id: SEED.to_string(),
            processed_count: 5,
            shutdown_reason: Some(ShutdownReason::TimeLimit),
            flagged_count: 0,
            unprocessed_saved: 3,
        };
        assert_eq!(summary.exit_reason(), "runtime threshold reached");
        assert!(!summary.completed_normally());

        // the storage trait is object safe
        let _: Box<dyn Storage + Send> = Box::new(SqliteStorage::new_in_memory().unwrap());
    }
}
