// automatix-registry/src/registry.rs
// ============================================================================
// Module: Connector Registry
// Description: A hot-reloadable handle over a Catalog, and the
//              ConnectorCatalog implementation the Workflow Runtime consumes.
// Purpose: Load definitions from disk at start, and reload them on demand
//          without a restart and without blocking in-flight readers.
// Dependencies: automatix_core, std::sync
// ============================================================================

//! ## Overview
//! [`ConnectorRegistry`] owns a directory path and a `RwLock<Arc<Catalog>>`.
//! A reload loads and validates a fresh [`Catalog`] off to the side, then
//! swaps the `Arc` under a brief write lock; any lookup already in flight
//! keeps the `Arc` it cloned out from under the old lock and finishes
//! against a consistent snapshot, per the platform's "reload without
//! downtime" requirement.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use automatix_core::ConnectorCatalog;
use automatix_core::RetryPolicy;

use crate::catalog::Catalog;
use crate::catalog::FunctionDefinition;
use crate::catalog::NodeCatalog;
use crate::catalog::SearchEntry;
use crate::definition_file::load_directory;
use crate::definition_file::DefinitionLoadDiagnostic;

/// Errors a registry load or reload can surface to the caller; individual
/// malformed files never produce one of these — they show up as
/// diagnostics instead.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The connector directory does not exist or could not be read at all.
    #[error("cannot read connector definition directory {path}: {reason}")]
    DirectoryUnreadable {
        /// The directory that could not be read.
        path: PathBuf,
        /// The underlying reason.
        reason: String,
    },
    /// The registry's internal lock was poisoned by a panicking holder.
    #[error("connector registry lock poisoned")]
    LockPoisoned,
}

/// A hot-reloadable handle over the connector catalog.
pub struct ConnectorRegistry {
    dir: PathBuf,
    catalog: RwLock<Arc<Catalog>>,
    diagnostics: RwLock<Vec<DefinitionLoadDiagnostic>>,
}

impl ConnectorRegistry {
    /// Loads every connector definition under `dir` and builds the initial
    /// catalog. Malformed files are recorded as diagnostics, retrievable via
    /// [`Self::diagnostics`], rather than failing the load.
    ///
    /// # Errors
    /// Returns [`RegistryError::DirectoryUnreadable`] only if `dir` itself
    /// cannot be listed (missing, not a directory, permission denied).
    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        if std::fs::read_dir(dir).is_err() {
            return Err(RegistryError::DirectoryUnreadable {
                path: dir.to_path_buf(),
                reason: "directory missing or unreadable".to_string(),
            });
        }
        let result = load_directory(dir);
        Ok(Self {
            dir: dir.to_path_buf(),
            catalog: RwLock::new(Arc::new(Catalog::build(result.definitions))),
            diagnostics: RwLock::new(result.diagnostics),
        })
    }

    /// Re-scans the connector directory and atomically swaps in a new
    /// catalog. Readers that already hold a cloned `Arc<Catalog>` keep
    /// seeing the snapshot they started with.
    ///
    /// # Errors
    /// Returns [`RegistryError::LockPoisoned`] if a previous holder of the
    /// write lock panicked while holding it.
    pub fn reload(&self) -> Result<(), RegistryError> {
        let result = load_directory(&self.dir);
        let fresh = Arc::new(Catalog::build(result.definitions));
        let mut guard = self.catalog.write().map_err(|_err| RegistryError::LockPoisoned)?;
        *guard = fresh;
        drop(guard);
        let mut diagnostics = self.diagnostics.write().map_err(|_err| RegistryError::LockPoisoned)?;
        *diagnostics = result.diagnostics;
        Ok(())
    }

    /// Returns a cloned handle to the current catalog snapshot. Cheap: this
    /// clones an `Arc`, not the catalog's contents.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.catalog.read().map_or_else(|poisoned| poisoned.into_inner().clone(), |guard| guard.clone())
    }

    /// The diagnostics produced by the most recent load or reload.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<DefinitionLoadDiagnostic> {
        self.diagnostics.read().map_or_else(|poisoned| poisoned.into_inner().clone(), |guard| guard.clone())
    }

    /// `listConnectors()`.
    #[must_use]
    pub fn list_connectors(&self) -> Vec<automatix_core::ConnectorDefinition> {
        self.snapshot().list_connectors().into_iter().cloned().collect()
    }

    /// `getConnector(appId)`.
    #[must_use]
    pub fn get_connector(&self, app_id: &str) -> Option<automatix_core::ConnectorDefinition> {
        self.snapshot().get_connector(app_id).cloned()
    }

    /// `getFunction(nodeType)`.
    #[must_use]
    pub fn get_function(&self, node_type: &str) -> Option<FunctionDefinition> {
        self.snapshot().get_function(node_type)
    }

    /// `getNodeCatalog()`.
    #[must_use]
    pub fn node_catalog(&self) -> NodeCatalog {
        self.snapshot().node_catalog()
    }

    /// `search(query)`.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<SearchEntry> {
        self.snapshot().search(query)
    }
}

impl ConnectorCatalog for ConnectorRegistry {
    fn is_valid_node_type(&self, node_type: &str) -> bool {
        self.snapshot().is_valid_node_type(node_type)
    }

    fn default_retry_policy(&self, node_type: &str) -> Option<RetryPolicy> {
        match self.snapshot().get_function(node_type)? {
            FunctionDefinition::Action(action) => Some(action.default_retry_policy),
            FunctionDefinition::Trigger(_trigger) => None,
        }
    }

    fn default_timeout_ms(&self, node_type: &str) -> Option<u64> {
        match self.snapshot().get_function(node_type)? {
            FunctionDefinition::Action(action) => action.timeout_ms,
            FunctionDefinition::Trigger(_trigger) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CONNECTOR: &str = r#"
id = "sheets"
name = "Google Sheets"
category = "productivity"

[authentication]
scheme = "o_auth2"
allowed_scopes = ["sheets.write"]

[[actions]]
id = "append_row"
name = "Append Row"
input_params = {}
"#;

    fn write_connector(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).expect("create");
        file.write_all(contents.as_bytes()).expect("write");
    }

    #[test]
    fn loads_initial_catalog_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_connector(dir.path(), "sheets.toml", CONNECTOR);
        let registry = ConnectorRegistry::load(dir.path()).expect("load");
        assert!(registry.is_valid_node_type("action.sheets:append_row"));
        assert!(registry.diagnostics().is_empty());
    }

    #[test]
    fn reload_picks_up_newly_added_connectors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ConnectorRegistry::load(dir.path()).expect("load");
        assert!(!registry.is_valid_node_type("action.sheets:append_row"));

        write_connector(dir.path(), "sheets.toml", CONNECTOR);
        registry.reload().expect("reload");
        assert!(registry.is_valid_node_type("action.sheets:append_row"));
    }

    #[test]
    fn reload_keeps_stale_snapshot_stable_for_in_flight_readers() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_connector(dir.path(), "sheets.toml", CONNECTOR);
        let registry = ConnectorRegistry::load(dir.path()).expect("load");
        let held = registry.snapshot();

        std::fs::remove_file(dir.path().join("sheets.toml")).expect("remove");
        registry.reload().expect("reload");

        assert!(held.is_valid_node_type("action.sheets:append_row"));
        assert!(!registry.snapshot().is_valid_node_type("action.sheets:append_row"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let missing = PathBuf::from("/nonexistent/automatix-connectors-dir");
        assert!(ConnectorRegistry::load(&missing).is_err());
    }
}
