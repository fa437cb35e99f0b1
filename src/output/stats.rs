//! Statistics generation from the sentinel database
//!
//! This module provides functionality for extracting and displaying
//! crawl results from the storage layer.

use crate::state::ShutdownReason;
use crate::storage::{Storage, UnprocessedRecord};
use crate::SentinelError;
use std::fmt::Write;

/// How many unprocessed records the report lists
pub const RECENT_UNPROCESSED_LIMIT: usize = 10;

/// Summary of everything the crawler has stored
#[derive(Debug, Clone)]
pub struct ReportStatistics {
    /// Total flagged comments
    pub total_flagged: usize,

    /// Distinct authors across flagged comments
    pub unique_flagged_actors: usize,

    /// Rows in the actors table
    pub tracked_actors: usize,

    /// Frontier records waiting for a resume
    pub unprocessed_count: usize,

    /// Reason recorded with the newest snapshot
    pub last_shutdown_reason: Option<ShutdownReason>,

    /// Newest unprocessed records first
    pub recent_unprocessed: Vec<UnprocessedRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
pub fn load_statistics(storage: &dyn Storage) -> Result<ReportStatistics, SentinelError> {
    Ok(ReportStatistics {
        total_flagged: storage.count_flagged_items()?,
        unique_flagged_actors: storage.count_unique_flagged_actors()?,
        tracked_actors: storage.list_actors()?.len(),
        unprocessed_count: storage.count_unprocessed()?,
        last_shutdown_reason: storage.latest_shutdown_reason()?,
        recent_unprocessed: storage.list_unprocessed(RECENT_UNPROCESSED_LIMIT)?,
    })
}

/// Renders statistics as the plain-text report
pub fn render_statistics(stats: &ReportStatistics) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Sentinel Statistics ===\n");
    let _ = writeln!(out, "Flagged Comments:");
    let _ = writeln!(out, "  Total flagged: {}", stats.total_flagged);
    let _ = writeln!(out, "  Unique commenters: {}", stats.unique_flagged_actors);
    let _ = writeln!(out, "  Tracked actors: {}", stats.tracked_actors);
    let _ = writeln!(out);

    let _ = writeln!(out, "Unprocessed Frontier:");
    let _ = writeln!(out, "  Pending profiles: {}", stats.unprocessed_count);
    let _ = writeln!(
        out,
        "  Last shutdown: {}",
        stats
            .last_shutdown_reason
            .map(|r| ShutdownReason::exit_reason(Some(r)))
            .unwrap_or("none recorded")
    );

    if !stats.recent_unprocessed.is_empty() {
        let _ = writeln!(out, "\nMost Recent ({}):", stats.recent_unprocessed.len());
        for record in &stats.recent_unprocessed {
            let _ = writeln!(
                out,
                "  - {} (depth {}, {}) via {}",
                record.node_id,
                record.depth,
                record
                    .reason
                    .map(|r| r.to_db_string())
                    .unwrap_or("unknown"),
                record.discovery_path
            );
        }
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &ReportStatistics) {
    print!("{}", render_statistics(stats));
}
