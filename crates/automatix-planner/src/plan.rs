// automatix-planner/src/plan.rs
// ============================================================================
// Module: Plan Compilation
// Description: The external plan shape and the pure compiler that turns it
//              into a validated WorkflowGraph.
// Purpose: Give an authoring surface (a planning UI, a saved template, an
//          LLM-assisted planner upstream of this crate) one normalization-
//          and-validation path into a graph the Workflow Runtime can execute.
// Dependencies: automatix_core, automatix_registry, serde, serde_json
// ============================================================================

//! ## Overview
//! [`ExternalPlan`] is the untrusted input: a flat list of `apps`, a single
//! `trigger`, a linear `steps` list, and whatever `missing_inputs` the
//! planning stage left unresolved. [`compile_plan`] normalizes every
//! `(app, operation)` pair through the connector registry's normalization
//! authority, rejects anything that does not resolve, merges answered
//! `missing_inputs` into their target node's parameters, and linearizes
//! `steps` into a chain of nodes — a step with no explicit `depends_on`
//! follows the previous step, and the first step follows the trigger. This
//! module never evaluates an `Llm` parameter; it is carried through
//! unresolved for the runtime's LLM Call Shell to handle at execution time.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use automatix_core::Edge;
use automatix_core::GraphError;
use automatix_core::Node;
use automatix_core::NodeId;
use automatix_core::ParamValue;
use automatix_core::RetryPolicy;
use automatix_core::WorkflowGraph;
use automatix_core::WorkflowId;
use automatix_registry::normalize_app_id;
use automatix_registry::ConnectorRegistry;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A node parameter value in an external plan; identical in shape to
/// [`automatix_core::ParamValue`] since the Planner Adapter neither
/// evaluates nor reinterprets parameters, only places them.
pub type PlannerParamValue = ParamValue;

/// The trigger half of an external plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// The raw (possibly unnormalized) app id.
    pub app: String,
    /// The trigger operation id.
    pub operation: String,
}

/// One step in an external plan's linear action list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// The step's id, unique within the plan. Must not be `"trigger"`.
    pub id: String,
    /// The raw (possibly unnormalized) app id.
    pub app: String,
    /// The action operation id.
    pub operation: String,
    /// Parameters already resolved by the planning stage.
    #[serde(default)]
    pub params: BTreeMap<String, PlannerParamValue>,
    /// Explicit predecessor step ids. Empty means "follows the previous
    /// step in `steps` order" (or the trigger, for the first step).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Retry policy override, carried through to the compiled node.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    /// Idempotency key template, carried through to the compiled node.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// One input the planning stage could not resolve on its own, keyed by `id`
/// so a step's parameter can reference it, and optionally carrying the
/// answer a user has since supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingInput {
    /// This input's id.
    pub id: String,
    /// The step (node) this input belongs to.
    pub node_id: String,
    /// The parameter name on that node this input resolves.
    pub param_name: String,
    /// A human-readable prompt describing what is needed.
    pub prompt: String,
    /// The user-supplied answer, if one has been given yet.
    #[serde(default)]
    pub answer: Option<Value>,
}

/// An external plan: the untrusted input [`compile_plan`] validates and
/// linearizes into a [`WorkflowGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPlan {
    /// Every app id this plan references, informational (compile_plan
    /// derives its own app set from `trigger` and `steps`).
    #[serde(default)]
    pub apps: Vec<String>,
    /// The plan's single trigger.
    pub trigger: TriggerSpec,
    /// The plan's linear action steps.
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    /// Inputs left unresolved by the planning stage.
    #[serde(default)]
    pub missing_inputs: Vec<MissingInput>,
}

/// The reserved node id of the trigger node in every compiled graph.
pub const TRIGGER_NODE_ID: &str = "trigger";

/// A successfully compiled plan: the graph plus any `missing_inputs` that
/// still lack an answer.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    /// The validated, runnable graph.
    pub graph: WorkflowGraph,
    /// Missing inputs with no answer yet; their target parameter is absent
    /// from the compiled node rather than filled with a placeholder.
    pub unresolved: Vec<MissingInput>,
}

/// Errors raised while compiling an external plan.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// A step or the trigger references an `(app, operation)` pair the
    /// connector registry does not resolve.
    #[error("unresolved operation: {app}:{operation}")]
    UnresolvedOperation {
        /// The normalized app id.
        app: String,
        /// The operation id.
        operation: String,
    },
    /// Two steps share the same id, or a step is id `"trigger"`.
    #[error("duplicate or reserved step id: {0}")]
    DuplicateStepId(String),
    /// A step's `depends_on` names a step id that does not exist earlier in
    /// the plan.
    #[error("step {step} depends on unknown step {depends_on}")]
    UnknownDependency {
        /// The dependent step.
        step: String,
        /// The unresolved dependency.
        depends_on: String,
    },
    /// The linearized graph failed structural validation.
    #[error("compiled graph is invalid: {0}")]
    Graph(#[from] GraphError),
}

impl PlannerError {
    /// Classifies this error into the shared error taxonomy. Every variant
    /// here is a validation failure: a plan that cannot compile is rejected
    /// outright, never retried.
    #[must_use]
    pub const fn kind(&self) -> automatix_core::ErrorKind {
        automatix_core::ErrorKind::Validation
    }
}

/// Compiles an external plan into a validated [`WorkflowGraph`].
///
/// Steps or a trigger referencing an `(app, operation)` pair the registry
/// does not resolve are rejected rather than silently dropped. Answered
/// `missing_inputs` are merged into their target node's parameters,
/// overriding any value already present there; unanswered ones are
/// returned in [`CompiledPlan::unresolved`] and their target parameter is
/// left absent.
///
/// # Errors
/// Returns [`PlannerError`] if any operation fails to resolve, step ids
/// collide or are reserved, a dependency is unknown, or the linearized
/// graph fails structural validation.
pub fn compile_plan(
    plan: &ExternalPlan,
    workflow_id: WorkflowId,
    registry: &ConnectorRegistry,
) -> Result<CompiledPlan, PlannerError> {
    let trigger_app = normalize_app_id(&plan.trigger.app);
    let trigger_node_type = format!("trigger.{trigger_app}:{}", plan.trigger.operation);
    if !registry.is_valid_node_type(&trigger_node_type) {
        return Err(PlannerError::UnresolvedOperation {
            app: trigger_app,
            operation: plan.trigger.operation.clone(),
        });
    }

    let mut seen_ids: BTreeSet<&str> = BTreeSet::new();
    seen_ids.insert(TRIGGER_NODE_ID);
    for step in &plan.steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(PlannerError::DuplicateStepId(step.id.clone()));
        }
    }

    let mut nodes = Vec::with_capacity(plan.steps.len() + 1);
    nodes.push(Node {
        id: NodeId::new(TRIGGER_NODE_ID),
        node_type: trigger_node_type,
        params: BTreeMap::new(),
        retry_policy: None,
        idempotency_key: None,
    });

    let mut edges = Vec::with_capacity(plan.steps.len());
    let mut previous_id = TRIGGER_NODE_ID.to_string();
    for step in &plan.steps {
        let app = normalize_app_id(&step.app);
        let node_type = format!("action.{app}:{}", step.operation);
        if !registry.is_valid_node_type(&node_type) {
            return Err(PlannerError::UnresolvedOperation { app, operation: step.operation.clone() });
        }

        let predecessors: Vec<&str> = if step.depends_on.is_empty() {
            vec![previous_id.as_str()]
        } else {
            step.depends_on.iter().map(String::as_str).collect()
        };
        for predecessor in &predecessors {
            if !seen_ids.contains(predecessor) {
                return Err(PlannerError::UnknownDependency {
                    step: step.id.clone(),
                    depends_on: (*predecessor).to_string(),
                });
            }
            edges.push(Edge { from: NodeId::new(*predecessor), to: NodeId::new(step.id.as_str()), label: None });
        }

        nodes.push(Node {
            id: NodeId::new(step.id.as_str()),
            node_type,
            params: step.params.clone(),
            retry_policy: step.retry_policy.clone(),
            idempotency_key: step.idempotency_key.clone(),
        });
        previous_id = step.id.clone();
    }

    let mut unresolved = Vec::new();
    for missing_input in &plan.missing_inputs {
        let Some(node) = nodes.iter_mut().find(|n| n.id.as_str() == missing_input.node_id) else {
            unresolved.push(missing_input.clone());
            continue;
        };
        match &missing_input.answer {
            Some(answer) => {
                node.params
                    .insert(missing_input.param_name.clone(), ParamValue::Static { value: answer.clone() });
            }
            None => {
                node.params.remove(&missing_input.param_name);
                unresolved.push(missing_input.clone());
            }
        }
    }

    let graph = WorkflowGraph { workflow_id, version: 1, nodes, edges };
    graph.validate()?;

    Ok(CompiledPlan { graph, unresolved })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SHEETS_CONNECTOR: &str = r#"
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

[[triggers]]
id = "new_email"
name = "New Email"
supports_webhook = true
"#;

    fn registry_with_sheets() -> ConnectorRegistry {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut file = std::fs::File::create(dir.path().join("sheets.toml")).expect("create");
        file.write_all(SHEETS_CONNECTOR.as_bytes()).expect("write");
        ConnectorRegistry::load(dir.path()).expect("load")
    }

    fn base_plan() -> ExternalPlan {
        ExternalPlan {
            apps: vec!["sheets".to_string()],
            trigger: TriggerSpec { app: "gsheets".to_string(), operation: "new_email".to_string() },
            steps: vec![PlanStep {
                id: "append".to_string(),
                app: "google-sheets".to_string(),
                operation: "append_row".to_string(),
                params: BTreeMap::new(),
                depends_on: Vec::new(),
                retry_policy: None,
                idempotency_key: None,
            }],
            missing_inputs: Vec::new(),
        }
    }

    #[test]
    fn compiles_a_linear_plan_with_synonym_app_ids() {
        let registry = registry_with_sheets();
        let compiled =
            compile_plan(&base_plan(), WorkflowId::new("wf-1"), &registry).expect("compile");
        assert_eq!(compiled.graph.nodes.len(), 2);
        assert_eq!(compiled.graph.nodes[1].node_type, "action.sheets:append_row");
        assert!(compiled.unresolved.is_empty());
    }

    #[test]
    fn rejects_unresolved_operations() {
        let registry = registry_with_sheets();
        let mut plan = base_plan();
        plan.steps[0].operation = "delete_everything".to_string();
        let result = compile_plan(&plan, WorkflowId::new("wf-1"), &registry);
        assert!(matches!(result, Err(PlannerError::UnresolvedOperation { .. })));
    }

    #[test]
    fn rejects_reserved_trigger_step_id() {
        let registry = registry_with_sheets();
        let mut plan = base_plan();
        plan.steps[0].id = "trigger".to_string();
        let result = compile_plan(&plan, WorkflowId::new("wf-1"), &registry);
        assert!(matches!(result, Err(PlannerError::DuplicateStepId(_))));
    }

    #[test]
    fn merges_answered_missing_inputs_into_node_params() {
        let registry = registry_with_sheets();
        let mut plan = base_plan();
        plan.missing_inputs.push(MissingInput {
            id: "mi-1".to_string(),
            node_id: "append".to_string(),
            param_name: "sheet_id".to_string(),
            prompt: "Which sheet?".to_string(),
            answer: Some(Value::String("sheet-123".to_string())),
        });
        let compiled =
            compile_plan(&plan, WorkflowId::new("wf-1"), &registry).expect("compile");
        let append_node = &compiled.graph.nodes[1];
        match append_node.params.get("sheet_id") {
            Some(ParamValue::Static { value }) => assert_eq!(value, &Value::String("sheet-123".to_string())),
            other => panic!("expected resolved static param, got {other:?}"),
        }
        assert!(compiled.unresolved.is_empty());
    }

    #[test]
    fn unanswered_missing_inputs_surface_as_unresolved() {
        let registry = registry_with_sheets();
        let mut plan = base_plan();
        plan.missing_inputs.push(MissingInput {
            id: "mi-1".to_string(),
            node_id: "append".to_string(),
            param_name: "sheet_id".to_string(),
            prompt: "Which sheet?".to_string(),
            answer: None,
        });
        let compiled =
            compile_plan(&plan, WorkflowId::new("wf-1"), &registry).expect("compile");
        assert_eq!(compiled.unresolved.len(), 1);
        assert!(!compiled.graph.nodes[1].params.contains_key("sheet_id"));
    }

    #[test]
    fn explicit_depends_on_overrides_implicit_chain() {
        let registry = registry_with_sheets();
        let mut plan = base_plan();
        plan.steps.push(PlanStep {
            id: "append_2".to_string(),
            app: "sheets".to_string(),
            operation: "append_row".to_string(),
            params: BTreeMap::new(),
            depends_on: vec!["trigger".to_string()],
            retry_policy: None,
            idempotency_key: None,
        });
        let compiled =
            compile_plan(&plan, WorkflowId::new("wf-1"), &registry).expect("compile");
        let has_trigger_to_second = compiled
            .graph
            .edges
            .iter()
            .any(|e| e.from.as_str() == "trigger" && e.to.as_str() == "append_2");
        assert!(has_trigger_to_second);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let registry = registry_with_sheets();
        let mut plan = base_plan();
        plan.steps[0].depends_on = vec!["nonexistent".to_string()];
        let result = compile_plan(&plan, WorkflowId::new("wf-1"), &registry);
        assert!(matches!(result, Err(PlannerError::UnknownDependency { .. })));
    }
}
