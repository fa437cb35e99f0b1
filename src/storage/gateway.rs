//! Persistence gateway used by the crawl engine
//!
//! Every call is synchronous. SQLite busy/locked errors are retried with the
//! blocking retry driver; any other failure is logged and reported as
//! zero/false so one bad write never aborts a crawl.

use crate::crawler::{retry_blocking, RetryPolicy};
use crate::state::{FrontierItem, ShutdownReason};
use crate::storage::{FlaggedItem, Storage, StorageResult};
use std::sync::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Thread-safe, failure-absorbing front for a [`Storage`] backend
pub struct PersistenceGateway {
    storage: Mutex<Box<dyn Storage + Send>>,
    retry: RetryPolicy,
}

impl PersistenceGateway {
    pub fn new(storage: Box<dyn Storage + Send>, retry: RetryPolicy) -> Self {
        Self {
            storage: Mutex::new(storage),
            retry,
        }
    }

    /// Runs `op` against the backend, retrying while the database is busy
    fn with_storage<T>(
        &self,
        operation: &str,
        mut op: impl FnMut(&mut dyn Storage) -> StorageResult<T>,
    ) -> StorageResult<T> {
        blocking_section(|| {
            retry_blocking(&self.retry, operation, || {
                let mut storage = self.storage.lock().unwrap_or_else(|e| e.into_inner());
                op(&mut **storage)
            })
        })
    }

    pub fn insert_flagged_item(&self, item: &FlaggedItem) -> bool {
        self.with_storage("insert_flagged_item", |s| s.insert_flagged_item(item))
            .unwrap_or_else(|e| {
                tracing::error!(actor_id = %item.actor_id, error = %e, "Failed to insert flagged item");
                false
            })
    }

    /// Batch insert that distinguishes a failed write (`None`) from a
    /// write that only hit existing rows (`Some(0)`)
    pub fn try_insert_flagged_items_batch(&self, items: &[FlaggedItem]) -> Option<usize> {
        match self.with_storage("insert_flagged_items_batch", |s| {
            s.insert_flagged_items_batch(items)
        }) {
            Ok(inserted) => {
                tracing::debug!(submitted = items.len(), inserted, "Persisted flagged batch");
                Some(inserted)
            }
            Err(e) => {
                tracing::error!(submitted = items.len(), error = %e, "Failed to persist flagged batch");
                None
            }
        }
    }

    /// Batch insert, returning the number of new rows (0 on failure)
    pub fn insert_flagged_items_batch(&self, items: &[FlaggedItem]) -> usize {
        self.try_insert_flagged_items_batch(items).unwrap_or(0)
    }

    pub fn upsert_actor(&self, actor_id: &str, aliases: &str) -> bool {
        match self.with_storage("upsert_actor", |s| s.upsert_actor(actor_id, aliases)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(actor_id, error = %e, "Failed to upsert actor");
                false
            }
        }
    }

    /// Persists the drained frontier, returning the number of new records
    pub fn save_unprocessed_frontier(&self, items: &[FrontierItem], reason: ShutdownReason) -> usize {
        match self.with_storage("save_unprocessed_frontier", |s| {
            s.save_unprocessed_frontier(items, reason)
        }) {
            Ok(saved) => {
                tracing::info!(saved, reason = %reason, "Saved unprocessed frontier");
                saved
            }
            Err(e) => {
                tracing::error!(items = items.len(), error = %e, "Failed to save unprocessed frontier");
                0
            }
        }
    }

    pub fn count_unprocessed(&self) -> usize {
        self.with_storage("count_unprocessed", |s| s.count_unprocessed())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to count unprocessed frontier");
                0
            })
    }

    pub fn count_flagged_items(&self) -> usize {
        self.with_storage("count_flagged_items", |s| s.count_flagged_items())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to count flagged items");
                0
            })
    }
}

/// Runs blocking storage work, moving it off the async scheduler when
/// called from a multi-threaded tokio worker
///
/// Current-thread runtimes cannot hand off their only worker, so the work
/// runs inline there.
fn blocking_section<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}
