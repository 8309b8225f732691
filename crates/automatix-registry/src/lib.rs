// automatix-registry/src/lib.rs
// ============================================================================
// Module: Automatix Connector Registry
// Description: Public API surface for the typed connector catalog.
// Purpose: Load, validate, normalize, and serve connector definitions to the
//          Planner Adapter and the Workflow Runtime.
// Dependencies: automatix_core, serde, serde_json, toml, thiserror
// ============================================================================

//! ## Overview
//! The Connector Registry loads a directory of connector description files
//! at process start and on explicit [`ConnectorRegistry::reload`], exposing
//! a process-wide read-mostly catalog. Readers never block each other: a
//! reload builds a whole new [`Catalog`] off to the side and swaps it in
//! behind a single `RwLock<Arc<_>>`, so an in-flight lookup always sees one
//! consistent snapshot for its duration, per the platform's "reload without
//! downtime" guidance.

#![doc(html_no_source)]

pub mod catalog;
pub mod definition_file;
pub mod normalize;
pub mod registry;

pub use catalog::Catalog;
pub use catalog::NodeCatalog;
pub use catalog::NodeCatalogEntry;
pub use catalog::SearchEntry;
pub use definition_file::DefinitionLoadDiagnostic;
pub use normalize::normalize_app_id;
pub use normalize::split_node_type;
pub use registry::ConnectorRegistry;
pub use registry::RegistryError;
