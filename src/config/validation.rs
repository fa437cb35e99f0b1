use crate::config::types::{
    Config, CrawlerConfig, FilterConfig, OutputConfig, RetryConfig, SteamConfig, TargetsConfig,
};
use crate::filter::ContentFilter;
use crate::profile::ProfileReference;
use crate::ConfigError;
use url::Url;

/// One request every ~17 minutes
const MIN_REQUESTS_PER_SECOND: f64 = 0.001;
const MAX_REQUESTS_PER_SECOND: f64 = 10_000.0;
const MAX_BURST_CAPACITY: u32 = 10_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_steam_config(&config.steam)?;
    validate_filter_config(&config.filter)?;
    validate_output_config(&config.output)?;
    validate_targets(&config.targets)?;
    Ok(())
}

/// Validates crawl engine configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if !(MIN_REQUESTS_PER_SECOND..=MAX_REQUESTS_PER_SECOND).contains(&config.requests_per_second) {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be between {} and {}, got {}",
            MIN_REQUESTS_PER_SECOND, MAX_REQUESTS_PER_SECOND, config.requests_per_second
        )));
    }

    if config.burst_capacity < 1 || config.burst_capacity > MAX_BURST_CAPACITY {
        return Err(ConfigError::Validation(format!(
            "burst_capacity must be between 1 and {}, got {}",
            MAX_BURST_CAPACITY, config.burst_capacity
        )));
    }

    if config.queue_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "queue_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.comment_page_size < 1 || config.comment_page_size > 500 {
        return Err(ConfigError::Validation(format!(
            "comment_page_size must be between 1 and 500, got {}",
            config.comment_page_size
        )));
    }

    Ok(())
}

/// Validates retry governor configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_factor must be >= 1.0, got {}",
            config.backoff_factor
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base_delay_ms ({}) cannot exceed max_delay_ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

/// Validates upstream API configuration
fn validate_steam_config(config: &SteamConfig) -> Result<(), ConfigError> {
    if config.api_key.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "api_key is empty; set steam.api-key or the {} environment variable",
            crate::config::API_KEY_ENV
        )));
    }

    for (name, value) in [
        ("api_base", &config.api_base),
        ("community_base", &config.community_base),
    ] {
        let url = Url::parse(value)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "{} must use http or https, got '{}'",
                name, value
            )));
        }
    }

    if config.request_timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request and connect timeouts must be >= 1 second".to_string(),
        ));
    }

    if config.max_connections_per_host < 1 {
        return Err(ConfigError::Validation(
            "max_connections_per_host must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the term list and compiles every pattern once
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if let Some(position) = config.terms.iter().position(|t| t.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "filter term #{} is empty",
            position + 1
        )));
    }

    if config.terms.is_empty() && config.patterns.is_empty() {
        tracing::warn!("Filter has no terms or patterns; nothing will be flagged");
    }

    ContentFilter::from_config(config)?;
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates configured seed references
fn validate_targets(config: &TargetsConfig) -> Result<(), ConfigError> {
    for seed in &config.seeds {
        ProfileReference::parse(seed)
            .map_err(|e| ConfigError::Validation(format!("Invalid seed '{}': {}", seed, e)))?;
    }
    Ok(())
}
