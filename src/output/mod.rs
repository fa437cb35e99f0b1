//! Output module for reporting crawl results
//!
//! This module handles:
//! - Loading statistics from the sentinel database
//! - Rendering the plain-text statistics report

pub mod stats;

pub use stats::{load_statistics, print_statistics, render_statistics, ReportStatistics};
