//! Profile references, comment extraction and timestamp parsing
//!
//! Everything here is pure: it interprets what the upstream community site
//! hands back (profile links, comment markup, timestamp strings) without
//! doing any I/O.

mod dates;
mod extractor;

pub use dates::{parse_steam_date, parse_steam_date_at};
pub use extractor::{ContentExtractor, ContentItem, ExtractedPage, SelectorExtractor};

use crate::{FetchError, FetchResult};
use url::Url;

/// References longer than this are rejected outright
pub const MAX_REFERENCE_LEN: usize = 500;

/// Hosts a profile URL may point at
const COMMUNITY_HOSTS: &[&str] = &["steamcommunity.com", "www.steamcommunity.com"];

/// A parsed pointer to a profile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProfileReference {
    /// Canonical 17-digit numeric id
    SteamId(String),

    /// Custom vanity name that needs an API lookup
    Vanity(String),
}

impl ProfileReference {
    /// Parses a profile URL, a `/id/..` or `/profiles/..` path, a bare
    /// 17-digit id, or a bare vanity name
    ///
    /// # Examples
    ///
    /// ```
    /// use steam_sentinel::profile::ProfileReference;
    ///
    /// let r = ProfileReference::parse("https://steamcommunity.com/id/gaben").unwrap();
    /// assert_eq!(r, ProfileReference::Vanity("gaben".to_string()));
    /// ```
    pub fn parse(input: &str) -> FetchResult<Self> {
        let input = input.trim();

        if input.is_empty() {
            return Err(FetchError::InvalidReference(
                "empty profile reference".to_string(),
            ));
        }

        if input.len() > MAX_REFERENCE_LEN {
            return Err(FetchError::InvalidReference(format!(
                "reference exceeds {} characters",
                MAX_REFERENCE_LEN
            )));
        }

        if input.contains("://") {
            let url = Url::parse(input)
                .map_err(|e| FetchError::InvalidReference(format!("{}: {}", input, e)))?;

            if !matches!(url.scheme(), "http" | "https") {
                return Err(FetchError::InvalidReference(format!(
                    "unsupported scheme '{}'",
                    url.scheme()
                )));
            }

            let host = url.host_str().unwrap_or_default();
            if !COMMUNITY_HOSTS.contains(&host) {
                return Err(FetchError::InvalidReference(format!(
                    "'{}' is not a community profile host",
                    host
                )));
            }

            return Self::from_path(url.path());
        }

        if input.starts_with('/') {
            return Self::from_path(input);
        }

        if is_canonical_id(input) {
            Ok(Self::SteamId(input.to_string()))
        } else if is_vanity_name(input) {
            Ok(Self::Vanity(input.to_string()))
        } else {
            Err(FetchError::InvalidReference(input.to_string()))
        }
    }

    fn from_path(path: &str) -> FetchResult<Self> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        match (segments.next(), segments.next()) {
            (Some("profiles"), Some(id)) if is_canonical_id(id) => Ok(Self::SteamId(id.to_string())),
            (Some("id"), Some(name)) if is_vanity_name(name) => Ok(Self::Vanity(name.to_string())),
            _ => Err(FetchError::InvalidReference(format!(
                "'{}' is not a /id/<name> or /profiles/<id> path",
                path
            ))),
        }
    }
}

/// True for a canonical 17-digit node id
pub fn is_canonical_id(s: &str) -> bool {
    s.len() == 17 && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_vanity_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 64
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_urls() {
        assert_eq!(
            ProfileReference::parse("https://steamcommunity.com/profiles/76561198056686440/")
                .unwrap(),
            ProfileReference::SteamId("76561198056686440".to_string())
        );
        assert_eq!(
            ProfileReference::parse("http://steamcommunity.com/id/some_user-1").unwrap(),
            ProfileReference::Vanity("some_user-1".to_string())
        );
    }

    #[test]
    fn test_parse_bare_references() {
        assert_eq!(
            ProfileReference::parse("76561198056686440").unwrap(),
            ProfileReference::SteamId("76561198056686440".to_string())
        );
        assert_eq!(
            ProfileReference::parse("gaben").unwrap(),
            ProfileReference::Vanity("gaben".to_string())
        );
        assert_eq!(
            ProfileReference::parse("/id/gaben/").unwrap(),
            ProfileReference::Vanity("gaben".to_string())
        );
    }

    #[test]
    fn test_short_number_is_a_vanity_name() {
        assert_eq!(
            ProfileReference::parse("12345").unwrap(),
            ProfileReference::Vanity("12345".to_string())
        );
    }

    #[test]
    fn test_rejects_foreign_hosts_and_schemes() {
        assert!(ProfileReference::parse("https://example.com/id/gaben").is_err());
        assert!(ProfileReference::parse("https://127.0.0.1/id/gaben").is_err());
        assert!(ProfileReference::parse("ftp://steamcommunity.com/id/gaben").is_err());
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert!(ProfileReference::parse("https://steamcommunity.com/profiles/123").is_err());
        assert!(ProfileReference::parse("https://steamcommunity.com/groups/x").is_err());
        assert!(ProfileReference::parse("https://steamcommunity.com/id/").is_err());
        assert!(ProfileReference::parse("has spaces").is_err());
        assert!(ProfileReference::parse("").is_err());
    }

    #[test]
    fn test_rejects_overlong_reference() {
        let long = format!("https://steamcommunity.com/id/{}", "a".repeat(MAX_REFERENCE_LEN));
        assert!(ProfileReference::parse(&long).is_err());
    }

    #[test]
    fn test_is_canonical_id() {
        assert!(is_canonical_id("76561198056686440"));
        assert!(!is_canonical_id("7656119805668644"));
        assert!(!is_canonical_id("7656119805668644x"));
    }
}
