use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Steam Sentinel
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub steam: SteamConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
}

/// Crawl engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers pulling from the frontier
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Token bucket refill rate (tokens per second)
    #[serde(rename = "requests-per-second")]
    pub requests_per_second: f64,

    /// Token bucket capacity (largest instantaneous burst)
    #[serde(rename = "burst-capacity", default = "default_burst_capacity")]
    pub burst_capacity: u32,

    /// Stop after this many profiles (0 = unlimited)
    #[serde(rename = "max-profiles-to-process", default)]
    pub max_profiles_to_process: u64,

    /// Stop after this many minutes of wall-clock time (0 = unlimited)
    #[serde(rename = "max-processing-time-minutes", default)]
    pub max_processing_time_minutes: u64,

    /// How long an idle worker waits on an empty frontier before re-checking
    #[serde(rename = "queue-timeout-secs", default = "default_queue_timeout")]
    pub queue_timeout_secs: u64,

    /// Number of comments requested per page
    #[serde(rename = "comment-page-size", default = "default_page_size")]
    pub comment_page_size: u32,
}

impl CrawlerConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    /// Wall-clock bound, or None when unlimited
    pub fn max_processing_time(&self) -> Option<Duration> {
        match self.max_processing_time_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
        }
    }
}

/// Retry governor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    #[serde(rename = "backoff-factor")]
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SteamConfig {
    /// Web API key; falls back to the STEAM_API_KEY environment variable
    #[serde(rename = "api-key", default)]
    pub api_key: String,

    #[serde(rename = "api-base", default = "default_api_base")]
    pub api_base: String,

    #[serde(rename = "community-base", default = "default_community_base")]
    pub community_base: String,

    /// Lifetime of a vanity-name resolution in the cache
    #[serde(rename = "resolve-cache-ttl-secs", default = "default_cache_ttl")]
    pub resolve_cache_ttl_secs: u64,

    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(
        rename = "max-connections-per-host",
        default = "default_connections_per_host"
    )]
    pub max_connections_per_host: usize,
}

/// Term list and patterns used to flag comments
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Case-insensitive substrings
    #[serde(default)]
    pub terms: Vec<String>,

    /// Regular expressions, compiled case-insensitive
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Default seed profiles when none are given on the command line
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub seeds: Vec<String>,
}

fn default_burst_capacity() -> u32 {
    1
}

fn default_queue_timeout() -> u64 {
    5
}

fn default_page_size() -> u32 {
    50
}

fn default_api_base() -> String {
    "https://api.steampowered.com".to_string()
}

fn default_community_base() -> String {
    "https://steamcommunity.com".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_connections_per_host() -> usize {
    8
}
