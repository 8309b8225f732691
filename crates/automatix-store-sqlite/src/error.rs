// automatix-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: The error boundary this crate owns, and its mapping into
//              automatix_core::RunLogError.
// Purpose: Give the store one place to classify rusqlite/serde failures
//          before they cross the RunLogStore trait boundary.
// Dependencies: automatix_core, rusqlite, thiserror
// ============================================================================

use automatix_core::RunLogError;

/// Errors raised by the `SQLite`-backed run log store.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    /// The underlying `SQLite` engine reported a failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored record's JSON blob could not be deserialized.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The blocking worker task running the query panicked or was cancelled.
    #[error("store worker task failed: {0}")]
    TaskJoin(String),
}

impl From<SqliteStoreError> for RunLogError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Sqlite(err) => Self::Storage(err.to_string()),
            SqliteStoreError::TaskJoin(message) => Self::Storage(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}
