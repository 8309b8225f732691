// automatix-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Run Log Store
// Description: Public API surface for the durable automatix_core::RunLogStore
//              implementation backed by SQLite.
// Purpose: Give the Workflow Runtime and Run Observability a persistence
//          engine satisfying the abstract key/value namespaces of the
//          platform's persisted state layout.
// Dependencies: automatix_core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! [`SqliteRunLogStore`] persists [`automatix_core::Execution`],
//! [`automatix_core::NodeExecution`], and [`automatix_core::DlqItem`]
//! records as canonical JSON blobs under a small set of indexed columns,
//! mirroring the abstract `exec/{executionId}`, `exec/{executionId}/node/{nodeId}`,
//! and `dlq/{executionId}/{nodeId}` namespaces the platform's persisted
//! state layout describes; any engine satisfying those namespaces'
//! guarantees is acceptable, and `SQLite` is the one this crate chooses.
//! Writes are idempotent on primary key via `INSERT OR REPLACE`, and every
//! blocking `rusqlite` call runs inside `tokio::task::spawn_blocking` so the
//! store never stalls the runtime's async executor.

#![doc(html_no_source)]

pub mod error;
pub mod retention;
pub mod schema;
pub mod store;

pub use error::SqliteStoreError;
pub use retention::RetentionPolicy;
pub use store::SqliteRunLogStore;
