// automatix-server/src/audit.rs
// ============================================================================
// Module: Audit Sinks
// Description: AuditSink implementations: stderr line-oriented logging for
//              the CLI, and a durable SQLite-backed sink for the server.
// Purpose: Route every log-worthy event through the automatix_core::AuditSink
//          trait seam rather than ad hoc println!/eprintln! calls.
// Dependencies: automatix_core, rusqlite
// ============================================================================

//! ## Overview
//! `automatix-core::interfaces` already defines [`automatix_core::AuditSink`]
//! and a [`automatix_core::NoopAuditSink`] default. This module adds the two
//! production implementations the platform's ambient stack calls for:
//! [`StderrAuditSink`] writes one line per event, human-readable, for the
//! CLI; [`SqliteAuditSink`] appends an append-only row to the same database
//! the run-log store uses, so audit history survives a restart.

use std::io::Write as _;
use std::sync::Mutex;

use automatix_core::AuditEvent;
use automatix_core::AuditSink;
use automatix_core::Clock;
use rusqlite::params;
use rusqlite::Connection;
use std::sync::Arc;

/// Writes one human-readable line per event to stderr.
#[derive(Debug, Default)]
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: AuditEvent) {
        // Written through `io::stderr()` directly rather than `eprintln!`,
        // which the workspace denies outside test code.
        let mut stderr = std::io::stderr();
        let _ignored = writeln!(stderr, "[audit] {}", describe(&event));
    }
}

/// Renders an [`AuditEvent`] as a short, human-readable line. Never
/// `Debug`-formats the event directly (the workspace denies `use_debug`);
/// this keeps the rendering stable if the enum's variants are reordered.
fn describe(event: &AuditEvent) -> String {
    match event {
        AuditEvent::WebhookAccepted { correlation_id } => {
            format!("webhook_accepted correlation_id={correlation_id}")
        }
        AuditEvent::WebhookRejected { reason } => format!("webhook_rejected reason={reason}"),
        AuditEvent::ExecutionStarted { execution_id } => {
            format!("execution_started execution_id={execution_id}")
        }
        AuditEvent::ExecutionFinished { execution_id, status } => {
            format!("execution_finished execution_id={execution_id} status={status}")
        }
        AuditEvent::NodeAttempt { execution_id, node_id, attempt } => {
            format!("node_attempt execution_id={execution_id} node_id={node_id} attempt={attempt}")
        }
        AuditEvent::NodeDlq { execution_id, node_id } => {
            format!("node_dlq execution_id={execution_id} node_id={node_id}")
        }
        AuditEvent::NodeFailed { execution_id, node_id } => {
            format!("node_failed execution_id={execution_id} node_id={node_id}")
        }
        AuditEvent::RegistryReloaded { connector_count } => {
            format!("registry_reloaded connector_count={connector_count}")
        }
    }
}

/// Appends audit events as rows in the same `SQLite` database the run-log
/// store uses. Blocking `rusqlite` calls are kept off the async executor by
/// running on whatever thread called [`Self::record`] — this sink is used
/// from synchronous contexts only (the runtime calls `AuditSink::record`
/// without awaiting), so no `spawn_blocking` indirection is needed here
/// unlike `SqliteRunLogStore`.
pub struct SqliteAuditSink {
    connection: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteAuditSink {
    /// Opens (creating if absent) the audit log table in the database at
    /// `path`.
    ///
    /// # Errors
    /// Returns a `rusqlite::Error` if the file cannot be opened or the
    /// table cannot be created.
    pub fn open(path: &std::path::Path, clock: Arc<dyn Clock>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self { connection: Mutex::new(conn), clock })
    }

    /// Opens an in-memory audit log, for tests.
    ///
    /// # Errors
    /// Returns a `rusqlite::Error` if the table cannot be created.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { connection: Mutex::new(conn), clock })
    }

    fn init(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at_unix_millis INTEGER NOT NULL,
                line TEXT NOT NULL
            );",
        )
    }

    /// Returns the most recent `limit` audit lines, newest last.
    ///
    /// # Panics
    /// Panics if the internal connection mutex is poisoned by a prior
    /// panicking holder.
    #[must_use]
    pub fn recent(&self, limit: u32) -> Vec<String> {
        let conn = self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Ok(mut stmt) =
            conn.prepare("SELECT line FROM audit_log ORDER BY id DESC LIMIT ?1")
        else {
            return Vec::new();
        };
        let Ok(rows) = stmt.query_map(params![limit], |row| row.get::<_, String>(0)) else {
            return Vec::new();
        };
        let mut lines: Vec<String> = rows.filter_map(Result::ok).collect();
        lines.reverse();
        lines
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, event: AuditEvent) {
        let line = describe(&event);
        let now = self.clock.now_unix_millis();
        let conn = self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ignored = conn.execute(
            "INSERT INTO audit_log (recorded_at_unix_millis, line) VALUES (?1, ?2)",
            params![now, line],
        );
    }
}

#[cfg(test)]
mod tests {
    use automatix_core::SystemClock;

    use super::*;

    #[test]
    fn sqlite_sink_persists_and_lists_events() {
        let sink = SqliteAuditSink::open_in_memory(Arc::new(SystemClock)).expect("open");
        sink.record(AuditEvent::RegistryReloaded { connector_count: 3 });
        sink.record(AuditEvent::WebhookRejected { reason: "bad signature".to_string() });
        let lines = sink.recent(10);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("registry_reloaded"));
        assert!(lines[1].contains("bad signature"));
    }

    #[test]
    fn stderr_sink_does_not_panic() {
        let sink = StderrAuditSink;
        sink.record(AuditEvent::ExecutionStarted {
            execution_id: automatix_core::ExecutionId::new("e1"),
        });
    }
}
