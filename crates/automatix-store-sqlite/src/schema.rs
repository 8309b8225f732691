// automatix-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema
// Description: Table definitions and pragma setup for the run log store.
// Purpose: Give put_execution/put_node_execution/put_dlq_item a durable,
//          WAL-journaled home with the indexes query_executions needs.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Each record type is stored as a canonical JSON blob (`record_json`) under
//! a handful of indexed columns pulled out for filtering, matching the
//! platform's choice to treat the persisted state layout as an abstract
//! key/value namespace rather than a relational schema. `INSERT OR REPLACE`
//! on the primary key gives every write the idempotent-on-primary-key
//! guarantee `RunLogStore` requires.

use rusqlite::Connection;

/// Current schema version, bumped whenever `init` changes in a way that is
/// not purely additive.
pub const SCHEMA_VERSION: i64 = 1;

/// Creates every table and index this store needs, and sets the pragmas a
/// durable single-file store wants (WAL journal, foreign keys on).
///
/// # Errors
/// Returns a `rusqlite::Error` if any statement fails.
pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "wal")?;
    conn.pragma_update(None, "synchronous", "normal")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS executions (
            execution_id          TEXT PRIMARY KEY,
            workflow_id           TEXT NOT NULL,
            user_id               TEXT NOT NULL,
            status                TEXT NOT NULL,
            start_time_unix_millis INTEGER NOT NULL,
            duration_ms           INTEGER,
            record_json           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_executions_workflow ON executions(workflow_id);
        CREATE INDEX IF NOT EXISTS idx_executions_user ON executions(user_id);
        CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status);
        CREATE INDEX IF NOT EXISTS idx_executions_start_time ON executions(start_time_unix_millis);

        CREATE TABLE IF NOT EXISTS node_executions (
            execution_id TEXT NOT NULL,
            node_id      TEXT NOT NULL,
            rowid_order  INTEGER,
            record_json  TEXT NOT NULL,
            PRIMARY KEY (execution_id, node_id)
        );

        CREATE TABLE IF NOT EXISTS dlq_items (
            execution_id TEXT NOT NULL,
            node_id      TEXT NOT NULL,
            record_json  TEXT NOT NULL,
            PRIMARY KEY (execution_id, node_id)
        );
        ",
    )
}
