//! Content filter for flagging comment text
//!
//! A comment is flagged when its lower-cased text contains any configured
//! term, or when any configured pattern matches the raw text. Patterns are
//! compiled once, case-insensitive, when the filter is built; the crawl
//! reads an immutable snapshot for its whole lifetime.

use crate::config::FilterConfig;
use crate::ConfigError;
use regex::{Regex, RegexBuilder};

/// Immutable term/pattern matcher
#[derive(Debug, Clone)]
pub struct ContentFilter {
    /// Lower-cased substrings
    terms: Vec<String>,

    /// Case-insensitive compiled patterns
    patterns: Vec<Regex>,
}

impl ContentFilter {
    /// Builds a filter from raw terms and pattern sources
    ///
    /// Blank terms are dropped, since an empty substring would match every
    /// comment. An invalid pattern is a configuration error.
    pub fn new<T, P>(terms: &[T], patterns: &[P]) -> Result<Self, ConfigError>
    where
        T: AsRef<str>,
        P: AsRef<str>,
    {
        let terms = terms
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let patterns = patterns
            .iter()
            .map(|source| {
                RegexBuilder::new(source.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ConfigError::InvalidPattern(format!("'{}': {}", source.as_ref(), e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { terms, patterns })
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        Self::new(&config.terms, &config.patterns)
    }

    /// Returns true if the text contains a term or matches a pattern
    pub fn is_flagged(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }

        let lowered = text.to_lowercase();
        if self.terms.iter().any(|term| lowered.contains(term.as_str())) {
            return true;
        }

        self.patterns.iter().any(|pattern| pattern.is_match(text))
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}
