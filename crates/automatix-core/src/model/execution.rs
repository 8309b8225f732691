// automatix-core/src/model/execution.rs
// ============================================================================
// Module: Automatix Execution Records
// Description: Execution, NodeExecution, and DlqItem — the records the
//              Workflow Runtime writes and Run Observability reads.
// Purpose: Model one run of a workflow and its per-node attempt history.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`Execution`] is created once per trigger delivery and is mutated
//! only by the runtime; retries create a *new* execution linked via
//! `parent_execution_id` rather than reopening the original. A
//! [`NodeExecution`] is created when the runtime schedules a node and is
//! mutated in place across attempts, each of which appends to
//! `retry_history`.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::model::error::ErrorKind;
use crate::model::identifiers::CorrelationId;
use crate::model::identifiers::ExecutionId;
use crate::model::identifiers::NodeId;
use crate::model::identifiers::UserId;
use crate::model::identifiers::WorkflowId;

/// Terminal and in-flight states of an [`Execution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created but not yet picked up by a worker.
    Pending,
    /// Currently executing nodes.
    Running,
    /// All non-skipped nodes succeeded.
    Succeeded,
    /// The trigger itself or a non-recoverable early node failed.
    Failed,
    /// One or more nodes ended in the DLQ but the graph still produced a
    /// terminal output.
    Partial,
}

impl ExecutionStatus {
    /// Whether this status is terminal (the execution will never transition
    /// again).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Partial)
    }
}

/// Aggregate metadata accumulated over an execution's node executions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// Total number of retry attempts across all nodes.
    pub retry_count: u32,
    /// Sum of every node's `costUSD`.
    pub total_cost_usd: f64,
    /// Sum of every node's `tokensUsed`.
    pub total_tokens_used: u64,
    /// `(# LLM nodes with cacheHit) / (# LLM nodes)`, or `0` if there are no
    /// LLM nodes.
    pub cache_hit_rate: f64,
    /// Mean duration across completed node executions, in milliseconds.
    pub avg_node_duration_ms: f64,
}

/// One run of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// This execution's unique id.
    pub execution_id: ExecutionId,
    /// The workflow this is a run of.
    pub workflow_id: WorkflowId,
    /// The tenant user this execution runs on behalf of.
    pub user_id: UserId,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// Unix-millis start timestamp.
    pub start_time_unix_millis: i64,
    /// Unix-millis end timestamp, set once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_unix_millis: Option<i64>,
    /// Duration in milliseconds, set once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// The kind of trigger that started this execution (`"webhook"` or
    /// `"polling"`, or `"manual"` for API-initiated executions).
    pub trigger_type: String,
    /// The trigger payload this execution was seeded with.
    pub trigger_data: Value,
    /// Total number of nodes in the graph reachable from the trigger.
    pub total_nodes: u32,
    /// Number of nodes that reached a terminal succeeded state.
    pub completed_nodes: u32,
    /// Number of nodes that reached the DLQ.
    pub failed_nodes: u32,
    /// The output of the terminal node(s), once the execution completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    /// A short error summary, set when `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// This execution's correlation id, propagated to every node call and
    /// log record.
    pub correlation_id: CorrelationId,
    /// Accumulated cost/retry/cache metadata.
    pub metadata: ExecutionMetadata,
    /// Set when this execution was created by retrying a prior one (via
    /// `POST /executions/{id}/retry`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<ExecutionId>,
}

impl Execution {
    /// Whether a parent execution (one that retried this one, or one that
    /// invoked this as a sub-workflow) should treat this execution as
    /// successful. `Partial` executions collapse to `false` here: a DLQ
    /// item means the parent's assumptions about completeness may not
    /// hold, even though the child's own status remains `Partial` rather
    /// than `Failed`.
    #[must_use]
    pub const fn succeeded_for_parent(&self) -> bool {
        matches!(self.status, ExecutionStatus::Succeeded)
    }
}

/// One retry attempt recorded in a [`NodeExecution`]'s history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// The 1-indexed attempt number this record describes.
    pub attempt: u32,
    /// Unix-millis timestamp the attempt started.
    pub started_at_unix_millis: i64,
    /// Unix-millis timestamp the attempt ended.
    pub ended_at_unix_millis: i64,
    /// The error kind this attempt failed with.
    pub error_kind: ErrorKind,
    /// A short error message.
    pub error_message: String,
    /// The HTTP status code returned, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
}

/// In-flight and terminal states of a [`NodeExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Scheduled but not yet running.
    Pending,
    /// Currently executing.
    Running,
    /// Terminated successfully.
    Succeeded,
    /// Failed this attempt and is not yet retried.
    Failed,
    /// Failed and a subsequent attempt has been scheduled; observable
    /// between attempts.
    Retrying,
    /// Retries exhausted or the error was terminal; moved to the DLQ.
    Dlq,
}

/// Per-node metadata accumulated for observability and cost accounting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeExecutionMetadata {
    /// The resolved idempotency key, if the node declared one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Whether this node's output was served from the LLM fingerprint
    /// cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    /// Cost of this node's invocation in USD, if it called a billed
    /// connector or LLM provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// Tokens consumed, for LLM nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    /// The HTTP status code the connector invocation returned, when
    /// applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    /// Response headers of interest (e.g. `retry-after`), when applicable.
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
    /// Set when the node was cut short by execution cancellation.
    #[serde(default)]
    pub cancelled: bool,
}

/// The record of one node's execution within one [`Execution`], mutated in
/// place across attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    /// The node id within the owning graph.
    pub node_id: NodeId,
    /// The node's registry-validated type.
    pub node_type: String,
    /// Current lifecycle status.
    pub status: NodeStatus,
    /// Unix-millis timestamp the current (or final) attempt started.
    pub start_time_unix_millis: i64,
    /// Unix-millis timestamp the node reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_unix_millis: Option<i64>,
    /// Duration in milliseconds, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// The current attempt number (1-indexed).
    pub attempt: u32,
    /// The maximum attempts this node's retry policy allows.
    pub max_attempts: u32,
    /// Resolved input parameters for the current attempt.
    pub input: Value,
    /// The node's output, once succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// A short error summary for the current/last attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The owning execution's correlation id.
    pub correlation_id: CorrelationId,
    /// Prior failed attempts, in attempt order.
    #[serde(default)]
    pub retry_history: Vec<RetryAttempt>,
    /// Cost/cache/idempotency metadata.
    pub metadata: NodeExecutionMetadata,
}

impl NodeExecution {
    /// Checks the invariant `len(retry_history) + 1 == attempt` that must
    /// hold once this node reaches a terminal status.
    #[must_use]
    pub fn retry_history_is_consistent(&self) -> bool {
        if matches!(self.status, NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Dlq) {
            self.retry_history.len() as u32 + 1 == self.attempt
        } else {
            true
        }
    }
}

/// A node execution that exhausted retries or failed terminally, parked for
/// manual or automatic replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqItem {
    /// The owning execution.
    pub execution_id: ExecutionId,
    /// The node that failed.
    pub node_id: NodeId,
    /// The most recent error message.
    pub last_error: String,
    /// Total attempts made before landing in the DLQ.
    pub attempts: u32,
    /// Unix-millis timestamp of the first failed attempt.
    pub first_failed_at_unix_millis: i64,
    /// Unix-millis timestamp of the last failed attempt.
    pub last_failed_at_unix_millis: i64,
    /// Earliest unix-millis timestamp a replay should be attempted, when
    /// known (e.g. derived from a `Retry-After` header on the last
    /// attempt).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable_after_unix_millis: Option<i64>,
    /// The resolved input payload the node was invoked with, replayed
    /// verbatim on manual replay.
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_node_execution(status: NodeStatus, attempt: u32, history_len: usize) -> NodeExecution {
        NodeExecution {
            node_id: NodeId::new("n1"),
            node_type: "action.sheets:append_row".to_string(),
            status,
            start_time_unix_millis: 0,
            end_time_unix_millis: None,
            duration_ms: None,
            attempt,
            max_attempts: 3,
            input: Value::Null,
            output: None,
            error: None,
            correlation_id: CorrelationId::new("c1"),
            retry_history: (0..history_len)
                .map(|i| RetryAttempt {
                    attempt: i as u32 + 1,
                    started_at_unix_millis: 0,
                    ended_at_unix_millis: 0,
                    error_kind: ErrorKind::TransientTransport,
                    error_message: "boom".to_string(),
                    http_status_code: Some(500),
                })
                .collect(),
            metadata: NodeExecutionMetadata::default(),
        }
    }

    #[test]
    fn retry_history_consistency_holds_for_terminal_states() {
        let node = base_node_execution(NodeStatus::Dlq, 3, 2);
        assert!(node.retry_history_is_consistent());
    }

    #[test]
    fn retry_history_consistency_detects_mismatch() {
        let node = base_node_execution(NodeStatus::Succeeded, 3, 0);
        assert!(!node.retry_history_is_consistent());
    }

    #[test]
    fn partial_execution_does_not_succeed_for_parent() {
        let execution = Execution {
            execution_id: ExecutionId::new("e1"),
            workflow_id: WorkflowId::new("wf1"),
            user_id: UserId::new("u1"),
            status: ExecutionStatus::Partial,
            start_time_unix_millis: 0,
            end_time_unix_millis: None,
            duration_ms: None,
            trigger_type: "webhook".to_string(),
            trigger_data: Value::Null,
            total_nodes: 1,
            completed_nodes: 0,
            failed_nodes: 1,
            final_output: None,
            error: None,
            correlation_id: CorrelationId::new("c1"),
            metadata: ExecutionMetadata::default(),
            parent_execution_id: None,
        };
        assert!(!execution.succeeded_for_parent());
    }
}
