//! Storage module for persisting crawl results
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Flagged comment and actor persistence
//! - Unprocessed frontier snapshots for resuming
//! - The persistence gateway the crawl engine writes through

mod gateway;
mod schema;
mod sqlite;
mod traits;

pub use gateway::PersistenceGateway;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::ShutdownReason;
use chrono::NaiveDateTime;

/// A comment that matched the content filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedItem {
    pub actor_id: String,
    pub actor_alias: String,

    /// Profile the comment was posted on
    pub subject_node_id: String,

    pub content_text: String,
    pub content_timestamp: Option<NaiveDateTime>,

    /// Discovery path of the subject, joined with `" -> "`
    pub discovery_path: String,
}

/// Author of at least one flagged comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRecord {
    pub node_id: String,
    pub aliases: String,
}

/// A frontier item persisted by an early shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprocessedRecord {
    pub node_id: String,
    pub discovery_path: String,
    pub depth: u32,
    pub reason: Option<ShutdownReason>,
    pub added_at: String,
}
