// automatix-server/src/graphs.rs
// ============================================================================
// Module: Workflow Graph Store
// Description: Loads WorkflowGraph JSON files from disk and serves the
//              latest version of each workflow id to the runtime.
// Purpose: Give `POST /executions` something to resolve `workflowId` against;
//          persistent graph storage beyond flat files is out of scope (§1).
// Dependencies: automatix_core, serde_json, std::fs
// ============================================================================

//! ## Overview
//! The platform's data model names `WorkflowGraph` but leaves its storage
//! engine unspecified beyond the abstract key/value namespaces of §6; this
//! crate's own concern is wiring the runtime to *some* graph source, so
//! [`WorkflowGraphStore`] is the simplest thing that satisfies it: one JSON
//! file per graph version under a directory, loaded at start and kept in
//! memory behind a `RwLock`, with [`WorkflowGraphStore::put`] letting the
//! Planner Adapter (via `automatix-cli` or a future authoring surface)
//! publish a freshly compiled graph without a restart.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::RwLock;

use automatix_core::WorkflowGraph;
use automatix_core::WorkflowId;
use thiserror::Error;

/// Errors raised while loading or serving workflow graphs.
#[derive(Debug, Error)]
pub enum GraphStoreError {
    /// The graph directory does not exist or could not be read.
    #[error("cannot read graph directory {path}: {reason}")]
    DirectoryUnreadable {
        /// The directory that could not be read.
        path: PathBuf,
        /// The underlying reason.
        reason: String,
    },
    /// The store's internal lock was poisoned by a panicking holder.
    #[error("graph store lock poisoned")]
    LockPoisoned,
    /// No graph is registered for the requested workflow id.
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),
}

/// An in-memory, file-backed store of the latest [`WorkflowGraph`] per
/// workflow id.
pub struct WorkflowGraphStore {
    graphs: RwLock<BTreeMap<WorkflowId, WorkflowGraph>>,
}

impl WorkflowGraphStore {
    /// Loads every `*.json` file under `dir` as a [`WorkflowGraph`].
    /// Malformed files are skipped; the directory itself must be readable.
    ///
    /// # Errors
    /// Returns [`GraphStoreError::DirectoryUnreadable`] if `dir` cannot be
    /// listed. A missing directory is treated as empty, not an error,
    /// since a fresh deployment may publish its first graph via
    /// [`Self::put`] rather than ship one on disk.
    pub fn load(dir: &Path) -> Result<Self, GraphStoreError> {
        let mut graphs = BTreeMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self { graphs: RwLock::new(graphs) });
            }
            Err(err) => {
                return Err(GraphStoreError::DirectoryUnreadable {
                    path: dir.to_path_buf(),
                    reason: err.to_string(),
                });
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else { continue };
            let Ok(graph) = serde_json::from_str::<WorkflowGraph>(&contents) else { continue };
            insert_latest(&mut graphs, graph);
        }
        Ok(Self { graphs: RwLock::new(graphs) })
    }

    /// Publishes `graph`, replacing any existing version of the same
    /// workflow id that is not newer.
    ///
    /// # Errors
    /// Returns [`GraphStoreError::LockPoisoned`] if a previous holder of
    /// the write lock panicked while holding it.
    pub fn put(&self, graph: WorkflowGraph) -> Result<(), GraphStoreError> {
        let mut guard = self.graphs.write().map_err(|_err| GraphStoreError::LockPoisoned)?;
        insert_latest(&mut guard, graph);
        Ok(())
    }

    /// Fetches the latest version of `workflow_id`.
    ///
    /// # Errors
    /// Returns [`GraphStoreError::UnknownWorkflow`] if no graph is
    /// registered, or [`GraphStoreError::LockPoisoned`] if a previous
    /// holder of the read lock panicked while holding it.
    pub fn get(&self, workflow_id: &WorkflowId) -> Result<WorkflowGraph, GraphStoreError> {
        let guard = self.graphs.read().map_err(|_err| GraphStoreError::LockPoisoned)?;
        guard
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| GraphStoreError::UnknownWorkflow(workflow_id.to_string()))
    }

    /// Lists every known workflow id and its latest version number.
    ///
    /// # Errors
    /// Returns [`GraphStoreError::LockPoisoned`] if a previous holder of
    /// the read lock panicked while holding it.
    pub fn list(&self) -> Result<Vec<(WorkflowId, u32)>, GraphStoreError> {
        let guard = self.graphs.read().map_err(|_err| GraphStoreError::LockPoisoned)?;
        Ok(guard.iter().map(|(id, graph)| (id.clone(), graph.version)).collect())
    }
}

fn insert_latest(graphs: &mut BTreeMap<WorkflowId, WorkflowGraph>, graph: WorkflowGraph) {
    match graphs.get(&graph.workflow_id) {
        Some(existing) if existing.version > graph.version => {}
        _ => {
            graphs.insert(graph.workflow_id.clone(), graph);
        }
    }
}
