//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Steam Sentinel database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Comments that matched the filter
CREATE TABLE IF NOT EXISTS flagged_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id TEXT NOT NULL,
    actor_alias TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    content TEXT NOT NULL,
    content_time TEXT,
    path TEXT NOT NULL,
    scraped_at TEXT NOT NULL,
    UNIQUE(actor_id, subject_id, content)
);

CREATE INDEX IF NOT EXISTS idx_flagged_actor ON flagged_items(actor_id);
CREATE INDEX IF NOT EXISTS idx_flagged_subject ON flagged_items(subject_id);

-- Authors of at least one flagged comment
CREATE TABLE IF NOT EXISTS actors (
    id TEXT PRIMARY KEY,
    aliases TEXT NOT NULL
);

-- Frontier left behind by a run that stopped at a threshold
CREATE TABLE IF NOT EXISTS unprocessed_frontier (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL,
    path TEXT NOT NULL,
    depth INTEGER NOT NULL,
    reason TEXT NOT NULL,
    added_at TEXT NOT NULL,
    UNIQUE(id, path)
);

CREATE INDEX IF NOT EXISTS idx_unprocessed_added ON unprocessed_frontier(added_at);
"#;

/// Initializes the database schema
///
/// Every statement is `IF NOT EXISTS`, so this is safe to run on an
/// existing database.
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
