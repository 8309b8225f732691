// automatix-core/src/model/graph.rs
// ============================================================================
// Module: Automatix Workflow Graph
// Description: WorkflowGraph, Node, Edge, and ParamValue shapes plus the
//              structural validation and topological ordering the Workflow
//              Runtime requires before executing a graph.
// Purpose: Model the DAG of connector operations a planned workflow compiles
//          to.
// Dependencies: serde, std::collections
// ============================================================================

//! ## Overview
//! A [`WorkflowGraph`] is the unit the Planner Adapter produces and the
//! Workflow Runtime consumes. Its node `params` are tagged [`ParamValue`]
//! variants rather than an untyped bag, so every parameter's provenance
//! (static literal, reference into a prior node's output, or an LLM call) is
//! explicit at load time.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::identifiers::NodeId;
use crate::model::identifiers::WorkflowId;
use crate::model::retry::RetryPolicy;

/// The role a node plays, derived from its `type` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// `trigger.*` — the single entry point of the graph.
    Trigger,
    /// `action.*` — a connector action invocation.
    Action,
    /// `transform.*` — a pure, in-process transformation.
    Transform,
    /// `branch.*` — an in-process decision that picks one outgoing edge.
    Branch,
    /// `llm.*` — an LLM Call Shell invocation.
    Llm,
}

impl NodeRole {
    /// Derives the role from a node type string's prefix.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownRole`] if the prefix does not match a
    /// known role.
    pub fn from_node_type(node_type: &str) -> Result<Self, GraphError> {
        let prefix = node_type.split('.').next().unwrap_or_default();
        match prefix {
            "trigger" => Ok(Self::Trigger),
            "action" => Ok(Self::Action),
            "transform" => Ok(Self::Transform),
            "branch" => Ok(Self::Branch),
            "llm" => Ok(Self::Llm),
            other => Err(GraphError::UnknownRole(other.to_string())),
        }
    }
}

/// A tagged, explicitly-constructed parameter value.
///
/// This replaces a dynamically-typed "any value" bag with a closed set of
/// shapes the Workflow Runtime knows how to resolve; unknown shapes are
/// rejected at load time by `serde`'s untagged-variant matching failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamValue {
    /// A literal value, used as-is.
    Static {
        /// The literal value.
        value: Value,
    },
    /// A reference into a prior node's output.
    Ref {
        /// The node whose output is being referenced. Must topologically
        /// precede the referring node.
        node_id: NodeId,
        /// A dot-path expression (`$` root, dotted fields, integer array
        /// indices) evaluated against that node's output.
        path: String,
    },
    /// An inline LLM call whose resolved value feeds this parameter.
    Llm {
        /// The LLM provider identifier (e.g. `openai`, `anthropic`).
        provider: String,
        /// The model identifier.
        model: String,
        /// The prompt template.
        prompt: String,
        /// An optional system prompt.
        #[serde(skip_serializing_if = "Option::is_none")]
        system: Option<String>,
        /// Sampling temperature.
        #[serde(skip_serializing_if = "Option::is_none")]
        temperature: Option<f64>,
        /// Maximum tokens to generate.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
        /// A JSON Schema the output must validate against.
        #[serde(skip_serializing_if = "Option::is_none")]
        json_schema: Option<Value>,
        /// Cache TTL in seconds for the fingerprint cache.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_ttl_sec: Option<u64>,
    },
}

/// A single node in a [`WorkflowGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the owning graph.
    pub id: NodeId,
    /// A registry-validated node type, `{role}.{appId}:{opId}` (or the short
    /// form `{appId}:{opId}`, which the registry resolves to the canonical
    /// form).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Parameters keyed by parameter name.
    pub params: BTreeMap<String, ParamValue>,
    /// Retry policy override; falls back to the registry's default for this
    /// operation when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    /// An optional idempotency-key template string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Node {
    /// Derives this node's role from its `node_type`.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownRole`] if the type prefix is unrecognized.
    pub fn role(&self) -> Result<NodeRole, GraphError> {
        NodeRole::from_node_type(&self.node_type)
    }
}

/// A directed edge between two nodes.
///
/// An optional `label` lets a `branch` node select among several outgoing
/// edges by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// The source node id.
    pub from: NodeId,
    /// The destination node id.
    pub to: NodeId,
    /// An optional label used by branch nodes to select this edge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A versioned, validated directed acyclic graph of nodes and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// The workflow this graph is a version of.
    pub workflow_id: WorkflowId,
    /// The monotonically increasing version number of this graph.
    pub version: u32,
    /// The graph's nodes.
    pub nodes: Vec<Node>,
    /// The graph's directed edges.
    pub edges: Vec<Edge>,
}

/// Errors raised while validating or traversing a [`WorkflowGraph`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A node's `type` prefix does not resolve to a known role.
    #[error("node type has unrecognized role prefix: {0}")]
    UnknownRole(String),
    /// An edge references a node id absent from the graph.
    #[error("edge references unknown node: {0}")]
    UnknownEdgeEndpoint(String),
    /// The graph has zero nodes with role `trigger`, or more than one.
    #[error("graph must have exactly one trigger node, found {0}")]
    TriggerCountInvalid(usize),
    /// The graph contains a cycle.
    #[error("graph contains a cycle")]
    CycleDetected,
    /// Two nodes share the same id.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    /// A `ref` parameter targets a node that does not topologically precede
    /// the referring node.
    #[error("ref parameter on node {referrer} targets {target}, which does not precede it")]
    RefNotPreceding {
        /// The node whose parameter contains the invalid reference.
        referrer: String,
        /// The referenced node id.
        target: String,
    },
}

impl WorkflowGraph {
    /// Validates structural invariants: unique node ids, edges reference
    /// existing nodes, the graph is acyclic, exactly one trigger node
    /// exists, and every `ref` parameter targets a topological predecessor.
    ///
    /// Node-type resolution against the connector registry is a separate
    /// step performed by the caller (the registry is a runtime dependency,
    /// not a compile-time one for this crate).
    ///
    /// # Errors
    /// Returns the first [`GraphError`] encountered.
    pub fn validate(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.clone()) {
                return Err(GraphError::DuplicateNodeId(node.id.to_string()));
            }
            node.role()?;
        }

        let node_ids: BTreeSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();
        for edge in &self.edges {
            if !node_ids.contains(&edge.from) {
                return Err(GraphError::UnknownEdgeEndpoint(edge.from.to_string()));
            }
            if !node_ids.contains(&edge.to) {
                return Err(GraphError::UnknownEdgeEndpoint(edge.to.to_string()));
            }
        }

        let trigger_count =
            self.nodes.iter().filter(|n| n.role() == Ok(NodeRole::Trigger)).count();
        if trigger_count != 1 {
            return Err(GraphError::TriggerCountInvalid(trigger_count));
        }

        let order = self.topological_order()?;

        let position: BTreeMap<&NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        for node in &self.nodes {
            let Some(&referrer_pos) = position.get(&node.id) else {
                continue;
            };
            for param in node.params.values() {
                if let ParamValue::Ref { node_id, .. } = param {
                    let target_pos = position.get(node_id).copied();
                    match target_pos {
                        Some(pos) if pos < referrer_pos => {}
                        _ => {
                            return Err(GraphError::RefNotPreceding {
                                referrer: node.id.to_string(),
                                target: node_id.to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(order)
    }

    /// Computes a topological order of the graph's nodes via Kahn's
    /// algorithm, returning an error if a cycle is present.
    ///
    /// # Errors
    /// Returns [`GraphError::CycleDetected`] if the graph is not acyclic.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: BTreeMap<&NodeId, usize> =
            self.nodes.iter().map(|n| (&n.id, 0usize)).collect();
        let mut adjacency: BTreeMap<&NodeId, Vec<&NodeId>> =
            self.nodes.iter().map(|n| (&n.id, Vec::new())).collect();

        for edge in &self.edges {
            if let Some(targets) = adjacency.get_mut(&edge.from) {
                targets.push(&edge.to);
            }
            if let Some(degree) = in_degree.get_mut(&edge.to) {
                *degree += 1;
            }
        }

        let mut queue: VecDeque<&NodeId> = self
            .nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node_id) = queue.pop_front() {
            order.push(node_id.clone());
            if let Some(targets) = adjacency.get(&node_id) {
                for target in targets {
                    if let Some(degree) = in_degree.get_mut(target) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(target);
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::CycleDetected);
        }
        Ok(order)
    }

    /// Returns the single trigger node, if the graph has been validated.
    #[must_use]
    pub fn trigger_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.role() == Ok(NodeRole::Trigger))
    }

    /// Returns the set of node ids reachable from the trigger node by
    /// following edges forward. Nodes outside this set are no-ops per the
    /// execution algorithm.
    #[must_use]
    pub fn reachable_from_trigger(&self) -> BTreeSet<NodeId> {
        let Some(trigger) = self.trigger_node() else {
            return BTreeSet::new();
        };
        let mut adjacency: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
        for edge in &self.edges {
            adjacency.entry(&edge.from).or_default().push(&edge.to);
        }
        let mut visited = BTreeSet::new();
        let mut stack = vec![&trigger.id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(targets) = adjacency.get(current) {
                for target in targets {
                    stack.push(target);
                }
            }
        }
        visited
    }
}
