//! Steam Sentinel: a social-graph crawler for flagged profile comments
//!
//! This crate walks Steam community profiles outward from seed profiles,
//! following "commented on" and "friend of" edges, scans every profile's
//! comments against an operator-supplied term list, and records matches.

pub mod config;
pub mod crawler;
pub mod filter;
pub mod output;
pub mod profile;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Steam Sentinel operations
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunPhase,
        to: state::RunPhase,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid filter pattern: {0}")]
    InvalidPattern(String),
}

/// Errors raised while talking to the upstream profile source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Could not resolve profile reference '{reference}'")]
    Resolution { reference: String },

    #[error("Invalid profile reference: {0}")]
    InvalidReference(String),

    #[error("Malformed response from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl FetchError {
    /// Returns true for transient failures worth another attempt
    ///
    /// Transport failures (connect, timeout, broken body) and HTTP 408, 429
    /// and 5xx are transient. Unknown or invalid references, malformed
    /// payloads and the remaining client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { source, .. } => {
                source.is_timeout()
                    || source.is_connect()
                    || source.is_request()
                    || source.is_body()
                    || source
                        .status()
                        .map(|s| is_retryable_status(s.as_u16()))
                        .unwrap_or(false)
            }
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Resolution { .. } | Self::InvalidReference(_) | Self::Malformed { .. } => false,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Result type alias for Steam Sentinel operations
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for upstream fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, Crawler, RunSummary};
pub use filter::ContentFilter;
pub use state::{FrontierItem, RunPhase, ShutdownReason};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let status = |code| FetchError::Status {
            url: "https://example.com".to_string(),
            status: code,
        };

        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(408).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(401).is_retryable());
    }

    #[test]
    fn test_resolution_is_fatal() {
        let err = FetchError::Resolution {
            reference: "nobody".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(!FetchError::InvalidReference("x".to_string()).is_retryable());
    }
}
