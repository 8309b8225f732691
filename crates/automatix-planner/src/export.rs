// automatix-planner/src/export.rs
// ============================================================================
// Module: Canonical Graph Export
// Description: Serializes a validated WorkflowGraph and its resolving
//              connector definitions into a canonical-JSON bundle with a
//              content hash.
// Purpose: Give planned workflows an archival/diffing artifact that can be
//          stored, compared, and replayed independent of the live registry.
// Dependencies: automatix_core, automatix_registry, serde, serde_jcs
// ============================================================================

//! ## Overview
//! [`export_graph`] takes a graph that has already passed
//! [`automatix_core::WorkflowGraph::validate`] and bundles it with the
//! [`automatix_core::ConnectorDefinition`]s its action and trigger nodes
//! resolve to, so the bundle is self-describing: a reader does not need a
//! live registry to see what each node type meant at export time. The bundle
//! is serialized to RFC 8785 canonical JSON and hashed, giving two exports
//! of the same graph against the same registry state byte-identical output.

use std::collections::BTreeMap;

use automatix_core::canonical_json_bytes;
use automatix_core::hash_canonical_json;
use automatix_core::ConnectorDefinition;
use automatix_core::HashDigest;
use automatix_core::WorkflowGraph;
use automatix_core::DEFAULT_HASH_ALGORITHM;
use automatix_registry::normalize::split_node_type;
use automatix_registry::normalize::CORE_APP_ID;
use automatix_registry::ConnectorRegistry;
use serde::Serialize;
use thiserror::Error;

/// A self-describing, content-addressed export of a planned workflow.
#[derive(Debug, Clone, Serialize)]
pub struct GraphBundle {
    /// The exported graph.
    pub graph: WorkflowGraph,
    /// The connector definitions resolving every action/trigger node in
    /// `graph`, keyed by app id. `core` operations (transforms, branches,
    /// LLM nodes) have no entry since they are in-process handlers.
    pub connector_definitions: BTreeMap<String, ConnectorDefinition>,
    /// The content hash of `graph` and `connector_definitions` together,
    /// computed over their canonical JSON encoding.
    pub content_hash: HashDigest,
}

/// Errors raised while exporting a graph bundle.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A node's type does not resolve against the given registry snapshot.
    #[error("node {node_id} has unresolved type {node_type}")]
    UnresolvedNode {
        /// The offending node's id.
        node_id: String,
        /// The offending node's type.
        node_type: String,
    },
    /// Canonical JSON serialization failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

#[derive(Serialize)]
struct BundleContent<'a> {
    graph: &'a WorkflowGraph,
    connector_definitions: &'a BTreeMap<String, ConnectorDefinition>,
}

/// Exports `graph` as a canonical-JSON bundle, resolving every action and
/// trigger node's app id against `registry` so the bundle carries the
/// connector definitions it depended on at export time.
///
/// # Errors
/// Returns [`ExportError::UnresolvedNode`] if a node's type no longer
/// resolves against `registry` (the registry changed since the graph was
/// compiled), or [`ExportError::Canonicalization`] if the bundle cannot be
/// serialized to canonical JSON.
pub fn export_graph(graph: &WorkflowGraph, registry: &ConnectorRegistry) -> Result<GraphBundle, ExportError> {
    let mut connector_definitions = BTreeMap::new();
    for node in &graph.nodes {
        let Some((_role, app_id, _op_id)) = split_node_type(&node.node_type) else {
            return Err(ExportError::UnresolvedNode {
                node_id: node.id.to_string(),
                node_type: node.node_type.clone(),
            });
        };
        let normalized_app_id = automatix_registry::normalize_app_id(app_id);
        if normalized_app_id == CORE_APP_ID {
            continue;
        }
        if connector_definitions.contains_key(&normalized_app_id) {
            continue;
        }
        let Some(connector) = registry.get_connector(app_id) else {
            return Err(ExportError::UnresolvedNode {
                node_id: node.id.to_string(),
                node_type: node.node_type.clone(),
            });
        };
        connector_definitions.insert(normalized_app_id, connector);
    }

    let content = BundleContent { graph, connector_definitions: &connector_definitions };
    let content_hash = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &content)
        .map_err(|err| ExportError::Canonicalization(err.to_string()))?;
    // Ensure the bundle itself would canonicalize cleanly before returning
    // it; `hash_canonical_json` above already proved this, so this call
    // cannot fail in practice but keeps the bundle's own serialization path
    // exercised the same way archival/diffing consumers will use it.
    let _ = canonical_json_bytes(&content).map_err(|err| ExportError::Canonicalization(err.to_string()))?;

    Ok(GraphBundle { graph: graph.clone(), connector_definitions, content_hash })
}
