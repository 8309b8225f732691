// automatix-core/src/lib.rs
// ============================================================================
// Module: Automatix Core Library
// Description: Public API surface for the Automatix workflow execution core.
// Purpose: Expose the data model, error taxonomy, interfaces, and runtime engine.
// Dependencies: crate::{model, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Automatix core models a multi-tenant workflow automation substrate:
//! connector-backed workflow graphs are executed node by node with retry,
//! dead-lettering, idempotency, and cost accounting. This crate is
//! transport-agnostic; it integrates through the traits in [`interfaces`]
//! rather than embedding a specific HTTP framework, LLM SDK, or storage
//! engine.

#![doc(html_no_source)]

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod interfaces;
pub mod model;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use model::clock::Clock;
pub use model::clock::SystemClock;
pub use model::connector::ActionDefinition;
pub use model::connector::AuthScheme;
pub use model::connector::ConnectorCategory;
pub use model::connector::ConnectorDefinition;
pub use model::connector::ParamType;
pub use model::connector::ParamTypeSpec;
pub use model::connector::TriggerDefinition;
pub use model::error::ErrorKind;
pub use model::error::RuntimeFailure;
pub use model::execution::DlqItem;
pub use model::execution::Execution;
pub use model::execution::ExecutionMetadata;
pub use model::execution::ExecutionStatus;
pub use model::execution::NodeExecution;
pub use model::execution::NodeExecutionMetadata;
pub use model::execution::NodeStatus;
pub use model::execution::RetryAttempt;
pub use model::graph::Edge;
pub use model::graph::GraphError;
pub use model::graph::Node;
pub use model::graph::NodeRole;
pub use model::graph::ParamValue;
pub use model::graph::WorkflowGraph;
pub use model::hashing::canonical_json_bytes;
pub use model::hashing::hash_bytes;
pub use model::hashing::hash_canonical_json;
pub use model::hashing::hash_parts;
pub use model::hashing::HashAlgorithm;
pub use model::hashing::HashDigest;
pub use model::hashing::HashError;
pub use model::hashing::DEFAULT_HASH_ALGORITHM;
pub use model::identifiers::CorrelationId;
pub use model::identifiers::DedupeHash;
pub use model::identifiers::ExecutionId;
pub use model::identifiers::NodeId;
pub use model::identifiers::PollId;
pub use model::identifiers::UserId;
pub use model::identifiers::WebhookId;
pub use model::identifiers::WorkflowId;
pub use model::path::resolve_path;
pub use model::path::PathError;
pub use model::retry::BackoffJitter;
pub use model::retry::ErrorClass;
pub use model::retry::RetryDecision;
pub use model::retry::RetryPolicy;
pub use model::trigger::TriggerEvent;
pub use model::trigger::TriggerKind;

pub use interfaces::AuditEvent;
pub use interfaces::AuditSink;
pub use interfaces::ConnectorCatalog;
pub use interfaces::ConnectorContext;
pub use interfaces::ConnectorError;
pub use interfaces::ConnectorInvoker;
pub use interfaces::ConnectorOutcome;
pub use interfaces::ExecutionPage;
pub use interfaces::ExecutionQuery;
pub use interfaces::ExecutionStats;
pub use interfaces::LlmMessage;
pub use interfaces::LlmProvider;
pub use interfaces::LlmProviderError;
pub use interfaces::LlmRequest;
pub use interfaces::LlmResponse;
pub use interfaces::LlmUsage;
pub use interfaces::MetricsSink;
pub use interfaces::NoopAuditSink;
pub use interfaces::NoopMetricsSink;
pub use interfaces::RunLogError;
pub use interfaces::RunLogStore;
pub use interfaces::Services;
pub use interfaces::StatsWindow;

pub use runtime::engine::ExecutionOutcome;
pub use runtime::engine::RuntimeConfig;
pub use runtime::engine::RuntimeError;
pub use runtime::engine::WorkflowRuntime;
