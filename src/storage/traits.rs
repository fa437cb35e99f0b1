//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::Retryable;
use crate::state::{FrontierItem, ShutdownReason};
use crate::storage::{ActorRecord, FlaggedItem, UnprocessedRecord};
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Actor not found: {0}")]
    ActorNotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// True when SQLite reports the database busy or locked
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        self.is_busy()
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines every write the crawl engine makes plus the reads
/// used by reporting.
pub trait Storage {
    // ===== Flagged Items =====

    /// Inserts one flagged item, returning false if the
    /// (actor, subject, content) triple already exists
    fn insert_flagged_item(&mut self, item: &FlaggedItem) -> StorageResult<bool>;

    /// Inserts a batch atomically, returning how many rows were new
    fn insert_flagged_items_batch(&mut self, items: &[FlaggedItem]) -> StorageResult<usize>;

    fn count_flagged_items(&self) -> StorageResult<usize>;

    /// Number of distinct actors across all flagged items
    fn count_unique_flagged_actors(&self) -> StorageResult<usize>;

    fn get_flagged_items_for_actor(&self, actor_id: &str) -> StorageResult<Vec<FlaggedItem>>;

    // ===== Actors =====

    /// Inserts an actor or overwrites its aliases
    fn upsert_actor(&mut self, actor_id: &str, aliases: &str) -> StorageResult<()>;

    fn get_actor(&self, actor_id: &str) -> StorageResult<ActorRecord>;

    fn list_actors(&self) -> StorageResult<Vec<ActorRecord>>;

    // ===== Unprocessed Frontier =====

    /// Persists frontier items left by an early shutdown, returning how
    /// many rows were new
    fn save_unprocessed_frontier(
        &mut self,
        items: &[FrontierItem],
        reason: ShutdownReason,
    ) -> StorageResult<usize>;

    fn count_unprocessed(&self) -> StorageResult<usize>;

    /// Most recently added records first
    fn list_unprocessed(&self, limit: usize) -> StorageResult<Vec<UnprocessedRecord>>;

    /// Reason attached to the most recent snapshot, if any
    fn latest_shutdown_reason(&self) -> StorageResult<Option<ShutdownReason>>;
}
