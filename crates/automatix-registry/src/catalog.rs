// automatix-registry/src/catalog.rs
// ============================================================================
// Module: Connector Catalog Snapshot
// Description: An immutable, indexed view over a set of loaded connector
//              definitions.
// Purpose: Serve listConnectors/getConnector/getFunction/isValidNodeType/
//          getNodeCatalog/search in O(1)-or-better without re-scanning the
//          definition list on every call.
// Dependencies: automatix_core, std::collections
// ============================================================================

//! ## Overview
//! A [`Catalog`] is built once per load/reload from a `Vec<ConnectorDefinition>`
//! and never mutated afterward; [`crate::registry::ConnectorRegistry`] swaps
//! whole catalogs under a lock rather than mutating one in place, so readers
//! always see one consistent snapshot.

use std::collections::BTreeMap;

use automatix_core::ActionDefinition;
use automatix_core::ConnectorCategory;
use automatix_core::ConnectorDefinition;
use automatix_core::TriggerDefinition;

use crate::normalize::normalize_app_id;
use crate::normalize::split_node_type;
use crate::normalize::CORE_APP_ID;

/// A single resolved operation (action or trigger), with enough context to
/// answer `getFunction`.
#[derive(Debug, Clone)]
pub enum FunctionDefinition {
    /// The operation is an action.
    Action(ActionDefinition),
    /// The operation is a trigger.
    Trigger(TriggerDefinition),
}

/// One entry in `getNodeCatalog`'s flattened connector listing, shaped for
/// UI consumption.
#[derive(Debug, Clone)]
pub struct NodeCatalogEntry {
    /// The connector's canonical app id.
    pub app_id: String,
    /// The connector's display name.
    pub name: String,
    /// The connector's category.
    pub category: ConnectorCategory,
    /// Action operation ids this connector exposes.
    pub action_ids: Vec<String>,
    /// Trigger operation ids this connector exposes.
    pub trigger_ids: Vec<String>,
}

/// The `{ connectors, categories }` shape `getNodeCatalog` returns.
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    /// One entry per loaded connector.
    pub connectors: Vec<NodeCatalogEntry>,
    /// The distinct categories present in this catalog, for UI grouping.
    pub categories: Vec<ConnectorCategory>,
}

/// A search hit: a connector or one of its operations matching a query.
#[derive(Debug, Clone)]
pub struct SearchEntry {
    /// The connector's canonical app id.
    pub app_id: String,
    /// The matching operation id, or `None` if the connector itself (its
    /// name) matched.
    pub operation_id: Option<String>,
    /// A human-readable label for display.
    pub label: String,
}

/// An immutable, indexed snapshot of the loaded connector definitions.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_app_id: BTreeMap<String, ConnectorDefinition>,
}

impl Catalog {
    /// Builds a catalog from a list of already-normalized, already-validated
    /// connector definitions. Definitions sharing a (post-normalization) app
    /// id overwrite earlier ones, keeping load order deterministic as "last
    /// file wins" for the same id.
    #[must_use]
    pub fn build(definitions: Vec<ConnectorDefinition>) -> Self {
        let mut by_app_id = BTreeMap::new();
        for definition in definitions {
            by_app_id.insert(definition.id.clone(), definition);
        }
        Self { by_app_id }
    }

    /// `listConnectors() -> ConnectorDefinition[]`.
    #[must_use]
    pub fn list_connectors(&self) -> Vec<&ConnectorDefinition> {
        self.by_app_id.values().collect()
    }

    /// `getConnector(appId) -> ConnectorDefinition?`, normalizing `app_id`
    /// first.
    #[must_use]
    pub fn get_connector(&self, app_id: &str) -> Option<&ConnectorDefinition> {
        self.by_app_id.get(&normalize_app_id(app_id))
    }

    /// `getFunction(nodeType) -> FunctionDefinition?`, accepting both the
    /// canonical `{role}.{appId}:{opId}` form and the short `{appId}:{opId}`
    /// form.
    #[must_use]
    pub fn get_function(&self, node_type: &str) -> Option<FunctionDefinition> {
        let (role, app_id, op_id) = split_node_type(node_type)?;
        if normalize_app_id(app_id) == CORE_APP_ID {
            // `core` operations (transform/branch/llm/http/schedule) are
            // in-process handlers, not catalog entries; any op id under
            // `core` resolves structurally rather than by lookup.
            return None;
        }
        let connector = self.get_connector(app_id)?;
        match role {
            Some("trigger") => connector.trigger(op_id).cloned().map(FunctionDefinition::Trigger),
            Some("action") | None => connector
                .action(op_id)
                .cloned()
                .map(FunctionDefinition::Action)
                .or_else(|| connector.trigger(op_id).cloned().map(FunctionDefinition::Trigger)),
            Some(_) => None,
        }
    }

    /// `isValidNodeType(nodeType) -> bool`. The sole authority the Planner
    /// Adapter and Workflow Runtime use to reject unknown nodes.
    ///
    /// `core.*` and `transform`/`branch`/`llm` roles over the `core` app id
    /// are always valid: they are in-process handlers that never consult
    /// the catalog, per the platform's "`core` is always a valid appId"
    /// rule.
    #[must_use]
    pub fn is_valid_node_type(&self, node_type: &str) -> bool {
        let Some((role, app_id, _op_id)) = split_node_type(node_type) else {
            return false;
        };
        if normalize_app_id(app_id) == CORE_APP_ID {
            return matches!(role, Some("transform") | Some("branch") | Some("llm") | None);
        }
        if role == Some("trigger") {
            return self.get_connector(app_id).is_some_and(|c| !c.triggers.is_empty());
        }
        self.get_function(node_type).is_some()
    }

    /// `getNodeCatalog() -> { connectors, categories }`.
    #[must_use]
    pub fn node_catalog(&self) -> NodeCatalog {
        let mut categories: Vec<ConnectorCategory> = Vec::new();
        let connectors = self
            .by_app_id
            .values()
            .map(|connector| {
                if !categories.contains(&connector.category) {
                    categories.push(connector.category.clone());
                }
                NodeCatalogEntry {
                    app_id: connector.id.clone(),
                    name: connector.name.clone(),
                    category: connector.category.clone(),
                    action_ids: connector.actions.iter().map(|a| a.id.clone()).collect(),
                    trigger_ids: connector.triggers.iter().map(|t| t.id.clone()).collect(),
                }
            })
            .collect();
        NodeCatalog { connectors, categories }
    }

    /// `search(query) -> entries`. A case-insensitive substring match over
    /// connector names/ids and operation ids/names.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<SearchEntry> {
        let needle = query.to_ascii_lowercase();
        let mut hits = Vec::new();
        for connector in self.by_app_id.values() {
            if connector.name.to_ascii_lowercase().contains(&needle) || connector.id.contains(&needle) {
                hits.push(SearchEntry {
                    app_id: connector.id.clone(),
                    operation_id: None,
                    label: connector.name.clone(),
                });
            }
            for action in &connector.actions {
                if action.name.to_ascii_lowercase().contains(&needle) || action.id.contains(&needle) {
                    hits.push(SearchEntry {
                        app_id: connector.id.clone(),
                        operation_id: Some(action.id.clone()),
                        label: format!("{} — {}", connector.name, action.name),
                    });
                }
            }
            for trigger in &connector.triggers {
                if trigger.name.to_ascii_lowercase().contains(&needle) || trigger.id.contains(&needle) {
                    hits.push(SearchEntry {
                        app_id: connector.id.clone(),
                        operation_id: Some(trigger.id.clone()),
                        label: format!("{} — {}", connector.name, trigger.name),
                    });
                }
            }
        }
        hits
    }
}
