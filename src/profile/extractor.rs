//! Comment extraction from rendered comment markup
//!
//! The upstream site's markup changes independently of the crawl logic, so
//! extraction sits behind the [`ContentExtractor`] trait. The default
//! [`SelectorExtractor`] locates comment containers with a prioritized list
//! of container selectors, then tries a prioritized list of field
//! strategies on each container until one yields a usable record.

use crate::profile::parse_steam_date;
use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};

/// One comment pulled from a profile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentItem {
    /// Link (or path) to the author's profile
    pub author_reference: String,

    /// Author display name at the time of scraping
    pub author_alias: String,

    /// Comment body
    pub text: String,

    /// When the comment was posted, if it could be interpreted
    pub timestamp: Option<NaiveDateTime>,
}

/// Result of extracting one page of comments
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// Usable comments, in page order
    pub items: Vec<ContentItem>,

    /// Number of comment containers seen, including ones that were skipped
    pub containers: usize,
}

/// Turns a page of comment markup into content items
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str) -> ExtractedPage;
}

/// One way of reading the fields of a comment container
struct FieldStrategy {
    name: &'static str,
    author: Selector,
    text: Selector,
    timestamp: Option<Selector>,
}

impl FieldStrategy {
    fn new(name: &'static str, author: &str, text: &str, timestamp: &str) -> Option<Self> {
        Some(Self {
            name,
            author: Selector::parse(author).ok()?,
            text: Selector::parse(text).ok()?,
            timestamp: Selector::parse(timestamp).ok(),
        })
    }

    fn apply(&self, container: ElementRef<'_>) -> Option<ContentItem> {
        let author = container.select(&self.author).next()?;
        let author_reference = author.value().attr("href")?.trim().to_string();
        if author_reference.is_empty() {
            return None;
        }
        let author_alias = collapse_whitespace(&author.text().collect::<String>());

        let text_element = container.select(&self.text).next()?;
        let text = collapse_whitespace(&text_element.text().collect::<String>());

        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(|selector| container.select(selector).next())
            .and_then(read_timestamp);

        Some(ContentItem {
            author_reference,
            author_alias,
            text,
            timestamp,
        })
    }
}

/// Exact unix time first, then the human readable forms
fn read_timestamp(element: ElementRef<'_>) -> Option<NaiveDateTime> {
    let value = element.value();
    let visible = element.text().collect::<String>();

    let parsed = [
        value.attr("data-timestamp"),
        value.attr("title"),
        value.attr("datetime"),
        Some(visible.as_str()),
    ]
    .into_iter()
    .flatten()
    .filter(|candidate| !candidate.trim().is_empty())
    .find_map(parse_steam_date);
    parsed
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// CSS-selector based extractor with prioritized fallbacks
pub struct SelectorExtractor {
    containers: Vec<Selector>,
    strategies: Vec<FieldStrategy>,
}

impl SelectorExtractor {
    /// Builds the extractor for the current community comment markup
    pub fn new() -> Self {
        let containers = [
            "div.commentthread_comment",
            "div[class*=\"comment\"]",
            ".comment",
            "[id*=\"comment\"]",
        ]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect();

        let strategies = [
            FieldStrategy::new(
                "thread",
                "a.commentthread_author_link",
                ".commentthread_comment_text",
                ".commentthread_comment_timestamp",
            ),
            FieldStrategy::new(
                "author-class",
                "a[class*=\"author\"]",
                ".commentthread_comment_content .comment_text",
                ".timestamp",
            ),
            FieldStrategy::new(
                "author-block",
                ".commentthread_comment_author a",
                ".commentthread_comment_content div[class*=\"text\"]",
                "span[class*=\"timestamp\"]",
            ),
            FieldStrategy::new(
                "profile-links",
                ".commentthread_comment_content a[href*=\"/id/\"], .commentthread_comment_content a[href*=\"/profiles/\"]",
                ".comment_content",
                "time",
            ),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self {
            containers,
            strategies,
        }
    }
}

impl Default for SelectorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for SelectorExtractor {
    fn extract(&self, html: &str) -> ExtractedPage {
        let fragment = Html::parse_fragment(html);

        let containers: Vec<ElementRef<'_>> = self
            .containers
            .iter()
            .map(|selector| fragment.select(selector).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        let mut page = ExtractedPage {
            items: Vec::with_capacity(containers.len()),
            containers: containers.len(),
        };

        for container in containers {
            let extracted = self.strategies.iter().find_map(|strategy| {
                strategy.apply(container).map(|item| (strategy.name, item))
            });

            match extracted {
                Some((strategy, item)) => {
                    tracing::trace!(strategy, author = %item.author_reference, "Extracted comment");
                    page.items.push(item);
                }
                None => {
                    tracing::warn!("Skipping comment container with no usable author/text");
                }
            }
        }

        page
    }
}
