// automatix-planner/src/lib.rs
// ============================================================================
// Module: Planner Adapter
// Description: Public API surface for compiling an external plan into a
//              validated WorkflowGraph, plus canonical graph export.
// Purpose: Give whatever produces plans (an authoring UI, an LLM-assisted
//          planner, a saved template) one pure, registry-validating path
//          into a runnable WorkflowGraph.
// Dependencies: automatix_core, automatix_registry, serde, serde_jcs
// ============================================================================

//! ## Overview
//! The Planner Adapter accepts an external plan object — `apps`, a
//! `trigger`, a linear list of `steps`, and any `missing_inputs` the
//! planning stage could not resolve — and compiles it into a
//! [`automatix_core::WorkflowGraph`]. It normalizes app ids through the
//! connector registry's normalization authority, rejects steps whose
//! `(app, operation)` does not resolve against the registry, and never
//! calls an LLM itself: every `Llm` parameter in the input plan is carried
//! through unevaluated, to be resolved by the Workflow Runtime's LLM Call
//! Shell at execution time. [`export::export_graph`] serializes a validated
//! graph into a canonical-JSON bundle with a content hash, for archival and
//! diffing.

#![doc(html_no_source)]

pub mod export;
pub mod plan;

pub use export::export_graph;
pub use export::ExportError;
pub use export::GraphBundle;
pub use plan::compile_plan;
pub use plan::CompiledPlan;
pub use plan::ExternalPlan;
pub use plan::MissingInput;
pub use plan::PlanStep;
pub use plan::PlannerError;
pub use plan::PlannerParamValue;
pub use plan::TriggerSpec;
pub use plan::TRIGGER_NODE_ID;
