//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{FrontierItem, ShutdownReason};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{ActorRecord, FlaggedItem, UnprocessedRecord};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// Text format for comment timestamps
const CONTENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const INSERT_FLAGGED_SQL: &str = "INSERT OR IGNORE INTO flagged_items \
     (actor_id, actor_alias, subject_id, content, content_time, path, scraped_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const INSERT_UNPROCESSED_SQL: &str = "INSERT OR IGNORE INTO unprocessed_frontier \
     (id, path, depth, reason, added_at) VALUES (?1, ?2, ?3, ?4, ?5)";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        // Short wait before surfacing SQLITE_BUSY; the gateway retries beyond this
        conn.busy_timeout(Duration::from_millis(250))?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn format_content_time(timestamp: Option<NaiveDateTime>) -> Option<String> {
        timestamp.map(|t| t.format(CONTENT_TIME_FORMAT).to_string())
    }

    fn parse_content_time(raw: Option<String>) -> Option<NaiveDateTime> {
        raw.and_then(|s| NaiveDateTime::parse_from_str(&s, CONTENT_TIME_FORMAT).ok())
    }
}

impl Storage for SqliteStorage {
    // ===== Flagged Items =====

    fn insert_flagged_item(&mut self, item: &FlaggedItem) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            INSERT_FLAGGED_SQL,
            params![
                item.actor_id,
                item.actor_alias,
                item.subject_node_id,
                item.content_text,
                Self::format_content_time(item.content_timestamp),
                item.discovery_path,
                now,
            ],
        )?;
        Ok(changed > 0)
    }

    fn insert_flagged_items_batch(&mut self, items: &[FlaggedItem]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare_cached(INSERT_FLAGGED_SQL)?;
            for item in items {
                // INSERT OR IGNORE reports 0 changes for an existing triple
                inserted += stmt.execute(params![
                    item.actor_id,
                    item.actor_alias,
                    item.subject_node_id,
                    item.content_text,
                    Self::format_content_time(item.content_timestamp),
                    item.discovery_path,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn count_flagged_items(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM flagged_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn count_unique_flagged_actors(&self) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT actor_id) FROM flagged_items",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_flagged_items_for_actor(&self, actor_id: &str) -> StorageResult<Vec<FlaggedItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT actor_id, actor_alias, subject_id, content, content_time, path
             FROM flagged_items WHERE actor_id = ?1 ORDER BY id",
        )?;

        let items = stmt
            .query_map(params![actor_id], |row| {
                Ok(FlaggedItem {
                    actor_id: row.get(0)?,
                    actor_alias: row.get(1)?,
                    subject_node_id: row.get(2)?,
                    content_text: row.get(3)?,
                    content_timestamp: Self::parse_content_time(row.get(4)?),
                    discovery_path: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    // ===== Actors =====

    fn upsert_actor(&mut self, actor_id: &str, aliases: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO actors (id, aliases) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET aliases = excluded.aliases",
            params![actor_id, aliases],
        )?;
        Ok(())
    }

    fn get_actor(&self, actor_id: &str) -> StorageResult<ActorRecord> {
        self.conn
            .query_row(
                "SELECT id, aliases FROM actors WHERE id = ?1",
                params![actor_id],
                |row| {
                    Ok(ActorRecord {
                        node_id: row.get(0)?,
                        aliases: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StorageError::ActorNotFound(actor_id.to_string()))
    }

    fn list_actors(&self) -> StorageResult<Vec<ActorRecord>> {
        let mut stmt = self.conn.prepare("SELECT id, aliases FROM actors ORDER BY id")?;

        let actors = stmt
            .query_map([], |row| {
                Ok(ActorRecord {
                    node_id: row.get(0)?,
                    aliases: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(actors)
    }

    // ===== Unprocessed Frontier =====

    fn save_unprocessed_frontier(
        &mut self,
        items: &[FrontierItem],
        reason: ShutdownReason,
    ) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare_cached(INSERT_UNPROCESSED_SQL)?;
            for item in items {
                inserted += stmt.execute(params![
                    item.node_id,
                    item.path_string(),
                    item.depth,
                    reason.to_db_string(),
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn count_unprocessed(&self) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM unprocessed_frontier",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_unprocessed(&self, limit: usize) -> StorageResult<Vec<UnprocessedRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, depth, reason, added_at FROM unprocessed_frontier
             ORDER BY row_id DESC LIMIT ?1",
        )?;

        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(UnprocessedRecord {
                    node_id: row.get(0)?,
                    discovery_path: row.get(1)?,
                    depth: row.get(2)?,
                    reason: ShutdownReason::from_db_string(&row.get::<_, String>(3)?),
                    added_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn latest_shutdown_reason(&self) -> StorageResult<Option<ShutdownReason>> {
        let reason: Option<String> = self
            .conn
            .query_row(
                "SELECT reason FROM unprocessed_frontier ORDER BY row_id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(reason.as_deref().and_then(ShutdownReason::from_db_string))
    }
}
