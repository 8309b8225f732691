// automatix-core/src/runtime/engine.rs
// ============================================================================
// Module: Automatix Workflow Runtime Engine
// Description: The graph executor: topological execution, parameter
//              resolution, node dispatch, retry/DLQ integration, and
//              execution-record bookkeeping.
// Purpose: Implement the Workflow Runtime's eight-step execution algorithm.
// Dependencies: tokio, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`WorkflowRuntime`] is the sole authority that turns node-level failures
//! into `NodeExecution` state transitions and decides an execution's
//! terminal status. It holds no global state; every collaborator it needs
//! arrives through a [`Services`] bundle passed to [`WorkflowRuntime::new`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::interfaces::ConnectorContext;
use crate::interfaces::LlmMessage;
use crate::interfaces::LlmRequest;
use crate::interfaces::RunLogError;
use crate::interfaces::Services;
use crate::model::clock::Clock;
use crate::model::error::ErrorKind;
use crate::model::execution::Execution;
use crate::model::execution::ExecutionMetadata;
use crate::model::execution::ExecutionStatus;
use crate::model::execution::NodeExecution;
use crate::model::execution::NodeExecutionMetadata;
use crate::model::execution::NodeStatus;
use crate::model::execution::RetryAttempt;
use crate::model::graph::Edge;
use crate::model::graph::GraphError;
use crate::model::graph::Node;
use crate::model::graph::NodeRole;
use crate::model::graph::ParamValue;
use crate::model::graph::WorkflowGraph;
use crate::model::identifiers::CorrelationId;
use crate::model::identifiers::ExecutionId;
use crate::model::identifiers::NodeId;
use crate::model::identifiers::UserId;
use crate::model::path::resolve_path;
use crate::model::retry::classify;
use crate::model::retry::decide_retry;
use crate::model::retry::RetryDecision;
use crate::model::retry::RetryPolicy;
use crate::model::trigger::TriggerEvent;

/// Runtime-wide configuration, per the platform's recognized configuration
/// options.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// `runtime.maxParallelExecutions` — upper bound enforced by the caller
    /// (typically `automatix-server`) that schedules execution futures;
    /// kept here so it travels with the rest of the runtime's tunables.
    pub max_parallel_executions: u32,
    /// `runtime.maxParallelNodesPerExecution` — upper bound on nodes with no
    /// path dependency that may run concurrently within one execution.
    /// `WorkflowRuntime` currently executes nodes serially in topological
    /// order; this field is honored by callers that choose to fan independent
    /// nodes out themselves (see `DESIGN.md`).
    pub max_parallel_nodes_per_execution: u32,
    /// `runtime.defaultNodeTimeoutMs` — used when neither the node nor the
    /// registry specifies a timeout.
    pub default_node_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_executions: 100,
            max_parallel_nodes_per_execution: 4,
            default_node_timeout_ms: 60_000,
        }
    }
}

/// A cooperative cancellation signal shared across an execution's in-flight
/// node calls. Checked at suspension points only, per the platform's
/// cancellation model; partially completed side effects are never rolled
/// back.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors raised by the Workflow Runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The graph failed structural validation.
    #[error("graph validation failed: {0}")]
    Graph(#[from] GraphError),
    /// A node's type does not resolve in the connector registry.
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),
    /// The run-log store failed.
    #[error("run log error: {0}")]
    RunLog(#[from] RunLogError),
    /// The execution was cancelled before it could complete.
    #[error("execution cancelled")]
    Cancelled,
}

/// The terminal result of one execution, as persisted.
pub type ExecutionOutcome = Execution;

/// The graph executor.
pub struct WorkflowRuntime {
    services: Services,
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
}

impl WorkflowRuntime {
    /// Builds a runtime over the given collaborators and configuration.
    #[must_use]
    pub fn new(services: Services, config: RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self { services, config, clock }
    }

    /// Runs one execution of `graph` to completion, seeded by
    /// `trigger_event`, per the platform's eight-step execution algorithm.
    ///
    /// # Errors
    /// Returns [`RuntimeError`] if the graph fails validation or the
    /// run-log store cannot be written to. Node-level failures do not
    /// surface as `Err`; they become `NodeExecution` and `Execution`
    /// status transitions instead.
    #[allow(clippy::too_many_lines, reason = "the eight-step execution algorithm reads as one procedure, not a set of helpers")]
    pub async fn start_execution(
        &self,
        graph: &WorkflowGraph,
        trigger_event: TriggerEvent,
        user_id: UserId,
        execution_id: ExecutionId,
        cancellation: CancellationToken,
    ) -> Result<ExecutionOutcome, RuntimeError> {
        let order = graph.validate()?;
        for node in &graph.nodes {
            if !self.services.registry.is_valid_node_type(&node.node_type) {
                return Err(RuntimeError::UnknownNodeType(node.node_type.clone()));
            }
        }

        let reachable = graph.reachable_from_trigger();
        let correlation_id = CorrelationId::new(execution_id.as_str());
        let now = self.clock.now_unix_millis();

        let trigger_node = graph.trigger_node().ok_or(GraphError::TriggerCountInvalid(0))?;
        let mut outputs: BTreeMap<NodeId, Value> = BTreeMap::new();
        outputs.insert(trigger_node.id.clone(), trigger_event.payload.clone());

        let total_nodes = u32::try_from(reachable.len().saturating_sub(1)).unwrap_or(u32::MAX);
        let mut execution = Execution {
            execution_id: execution_id.clone(),
            workflow_id: graph.workflow_id.clone(),
            user_id: user_id.clone(),
            status: ExecutionStatus::Running,
            start_time_unix_millis: now,
            end_time_unix_millis: None,
            duration_ms: None,
            trigger_type: trigger_event.trigger_type_header().to_string(),
            trigger_data: trigger_event.payload.clone(),
            total_nodes,
            completed_nodes: 0,
            failed_nodes: 0,
            final_output: None,
            error: None,
            correlation_id: correlation_id.clone(),
            metadata: ExecutionMetadata::default(),
            parent_execution_id: None,
        };
        self.services.run_log.put_execution(&execution).await?;

        let edges_by_source: BTreeMap<&NodeId, Vec<&Edge>> = {
            let mut map: BTreeMap<&NodeId, Vec<&Edge>> = BTreeMap::new();
            for edge in &graph.edges {
                map.entry(&edge.from).or_default().push(edge);
            }
            map
        };
        let nodes_by_id: BTreeMap<&NodeId, &Node> = graph.nodes.iter().map(|n| (&n.id, n)).collect();

        let mut dead_edges: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
        let mut llm_node_count: u32 = 0;
        let mut llm_cache_hits: u32 = 0;
        let mut node_durations_ms: Vec<i64> = Vec::new();
        let mut idempotency_cache: BTreeMap<(NodeId, String), Value> = BTreeMap::new();

        for node_id in &order {
            if cancellation.is_cancelled() {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some("execution cancelled".to_string());
                break;
            }
            if *node_id == trigger_node.id {
                continue;
            }
            if !reachable.contains(node_id) {
                continue;
            }

            let incoming: Vec<&Edge> =
                graph.edges.iter().filter(|e| &e.to == node_id).collect();
            let has_incoming = !incoming.is_empty();
            let all_incoming_dead = has_incoming
                && incoming.iter().all(|e| dead_edges.contains(&(e.from.clone(), e.to.clone())));
            if all_incoming_dead {
                if let Some(outgoing) = edges_by_source.get(node_id) {
                    for edge in outgoing {
                        dead_edges.insert((edge.from.clone(), edge.to.clone()));
                    }
                }
                continue;
            }

            let Some(node) = nodes_by_id.get(node_id).copied() else { continue };
            let role = node.role()?;

            let (resolved_params, pending_llm_params) = match self.resolve_params(node, &outputs) {
                Ok(params) => params,
                Err(message) => {
                    self.record_validation_failure(&execution, node, &message).await?;
                    execution.failed_nodes += 1;
                    if let Some(outgoing) = edges_by_source.get(node_id) {
                        for edge in outgoing {
                            dead_edges.insert((edge.from.clone(), edge.to.clone()));
                        }
                    }
                    continue;
                }
            };

            let idempotency_key =
                node.idempotency_key.as_deref().map(|tpl| render_idempotency_key(tpl, &resolved_params));
            if let Some(key) = &idempotency_key {
                if let Some(cached) = idempotency_cache.get(&(node.id.clone(), key.clone())) {
                    outputs.insert(node.id.clone(), cached.clone());
                    execution.completed_nodes += 1;
                    continue;
                }
            }

            let policy = node
                .retry_policy
                .clone()
                .or_else(|| self.services.registry.default_retry_policy(&node.node_type))
                .unwrap_or_default();

            let outcome = self
                .run_node_with_retries(
                    node,
                    role,
                    &resolved_params,
                    &pending_llm_params,
                    &execution,
                    &policy,
                    &cancellation,
                )
                .await;

            match outcome {
                NodeOutcome::Succeeded { output, duration_ms, cost_usd, tokens_used, cache_hit } => {
                    if let Some(key) = idempotency_key {
                        idempotency_cache.insert((node.id.clone(), key), output.clone());
                    }
                    if let Some(cost) = cost_usd {
                        execution.metadata.total_cost_usd += cost;
                    }
                    if let Some(tokens) = tokens_used {
                        execution.metadata.total_tokens_used += tokens;
                    }
                    if let Some(hit) = cache_hit {
                        llm_node_count += 1;
                        if hit {
                            llm_cache_hits += 1;
                        }
                    }
                    if role == NodeRole::Branch {
                        if let Value::String(label) = &output {
                            if let Some(outgoing) = edges_by_source.get(node_id) {
                                for edge in outgoing {
                                    if edge.label.as_deref() != Some(label.as_str()) {
                                        dead_edges.insert((edge.from.clone(), edge.to.clone()));
                                    }
                                }
                            }
                        }
                    }
                    outputs.insert(node.id.clone(), output);
                    execution.completed_nodes += 1;
                    node_durations_ms.push(duration_ms);
                }
                NodeOutcome::Dlq { retry_count, duration_ms, cost_usd, tokens_used } => {
                    execution.failed_nodes += 1;
                    execution.metadata.retry_count += retry_count;
                    if let Some(cost) = cost_usd {
                        execution.metadata.total_cost_usd += cost;
                    }
                    if let Some(tokens) = tokens_used {
                        execution.metadata.total_tokens_used += tokens;
                    }
                    node_durations_ms.push(duration_ms);
                    if let Some(outgoing) = edges_by_source.get(node_id) {
                        for edge in outgoing {
                            dead_edges.insert((edge.from.clone(), edge.to.clone()));
                        }
                    }
                }
                NodeOutcome::Failed { duration_ms, cost_usd, tokens_used } => {
                    execution.failed_nodes += 1;
                    if let Some(cost) = cost_usd {
                        execution.metadata.total_cost_usd += cost;
                    }
                    if let Some(tokens) = tokens_used {
                        execution.metadata.total_tokens_used += tokens;
                    }
                    node_durations_ms.push(duration_ms);
                    if let Some(outgoing) = edges_by_source.get(node_id) {
                        for edge in outgoing {
                            dead_edges.insert((edge.from.clone(), edge.to.clone()));
                        }
                    }
                }
            }
        }

        self.finalize_execution(&mut execution, &outputs, &order, llm_node_count, llm_cache_hits, &node_durations_ms);
        self.services.run_log.put_execution(&execution).await?;
        Ok(execution)
    }

    /// Resolves every `static`/`ref` parameter of `node` against the current
    /// outputs map. `llm`-typed parameters are deferred to
    /// [`Self::resolve_llm_params`], called from inside the retry loop so
    /// the LLM call's own suspension and failure classification happen
    /// alongside a node's other retryable work.
    fn resolve_params(
        &self,
        node: &Node,
        outputs: &BTreeMap<NodeId, Value>,
    ) -> Result<(BTreeMap<String, Value>, BTreeMap<String, PendingLlmParam>), String> {
        let mut resolved = BTreeMap::new();
        let mut pending_llm = BTreeMap::new();
        for (name, param) in &node.params {
            match param {
                ParamValue::Static { value } => {
                    resolved.insert(name.clone(), value.clone());
                }
                ParamValue::Ref { node_id, path } => {
                    let root = outputs
                        .get(node_id)
                        .ok_or_else(|| format!("no output recorded for referenced node {node_id}"))?;
                    let value = resolve_path(root, path).map_err(|err| err.to_string())?.clone();
                    resolved.insert(name.clone(), value);
                }
                ParamValue::Llm { provider, model, prompt, system, temperature, max_tokens, json_schema, .. } => {
                    pending_llm.insert(
                        name.clone(),
                        PendingLlmParam {
                            provider: provider.clone(),
                            model: model.clone(),
                            prompt: prompt.clone(),
                            system: system.clone(),
                            temperature: *temperature,
                            max_tokens: *max_tokens,
                            json_schema: json_schema.clone(),
                        },
                    );
                }
            }
        }
        Ok((resolved, pending_llm))
    }

    /// Calls the LLM Call Shell once per pending `llm`-typed parameter,
    /// accumulating cost and token usage. Stops at the first failure,
    /// returning the cost/tokens incurred by calls that already succeeded
    /// so a partially-resolved node still accounts for real upstream spend.
    async fn resolve_llm_params(
        &self,
        pending: &BTreeMap<String, PendingLlmParam>,
        context: &ConnectorContext,
    ) -> (BTreeMap<String, Value>, f64, u64, Option<DispatchFailure>) {
        let mut resolved = BTreeMap::new();
        let mut cost_usd = 0.0;
        let mut tokens_used: u64 = 0;
        for (name, spec) in pending {
            let mut messages = Vec::new();
            if let Some(system) = &spec.system {
                messages.push(LlmMessage { role: "system".to_string(), content: system.clone() });
            }
            messages.push(LlmMessage { role: "user".to_string(), content: spec.prompt.clone() });
            let request = LlmRequest {
                provider: spec.provider.clone(),
                model: spec.model.clone(),
                messages,
                temperature: spec.temperature,
                max_tokens: spec.max_tokens,
                json_schema: spec.json_schema.clone(),
                user_id: context.user_id.clone(),
                workflow_id: context.workflow_id.clone(),
            };
            match self.services.llm.generate(&request).await {
                Ok(response) => {
                    cost_usd += response.cost_usd;
                    tokens_used += response.usage.prompt_tokens + response.usage.completion_tokens;
                    resolved.insert(name.clone(), response.parsed_json.unwrap_or(Value::String(response.text)));
                }
                Err(err) => {
                    let failure = DispatchFailure {
                        kind: err.kind(),
                        message: err.to_string(),
                        http_status: None,
                        retry_after_secs: match &err {
                            crate::interfaces::LlmProviderError::RateLimited { retry_after_secs, .. } => {
                                *retry_after_secs
                            }
                            _ => None,
                        },
                    };
                    return (resolved, cost_usd, tokens_used, Some(failure));
                }
            }
        }
        (resolved, cost_usd, tokens_used, None)
    }

    /// Runs one node through its retry loop until it succeeds or reaches a
    /// terminal failure state (`Failed` for a non-retryable error, `Dlq`
    /// once retries are exhausted).
    async fn run_node_with_retries(
        &self,
        node: &Node,
        role: NodeRole,
        resolved_params: &BTreeMap<String, Value>,
        pending_llm_params: &BTreeMap<String, PendingLlmParam>,
        execution: &Execution,
        policy: &RetryPolicy,
        cancellation: &CancellationToken,
    ) -> NodeOutcome {
        let mut attempt: u32 = 1;
        let mut retry_history: Vec<RetryAttempt> = Vec::new();
        let start = self.clock.now_unix_millis();

        loop {
            let attempt_started = self.clock.now_unix_millis();
            let context = ConnectorContext {
                correlation_id: execution.correlation_id.clone(),
                execution_id: execution.execution_id.clone(),
                node_id: node.id.clone(),
                workflow_id: execution.workflow_id.as_str().to_string(),
                user_id: execution.user_id.as_str().to_string(),
                deadline_unix_millis: attempt_started
                    + i64::try_from(self.config.default_node_timeout_ms).unwrap_or(i64::MAX),
            };

            let (llm_resolved, llm_param_cost, llm_param_tokens, llm_param_failure) =
                if pending_llm_params.is_empty() {
                    (BTreeMap::new(), 0.0, 0, None)
                } else {
                    self.resolve_llm_params(pending_llm_params, &context).await
                };

            let mut attempt_params = resolved_params.clone();
            attempt_params.extend(llm_resolved);
            let input_value =
                serde_json::to_value(&attempt_params).unwrap_or(Value::Object(serde_json::Map::new()));

            let dispatch_result = match llm_param_failure {
                Some(failure) => Err(failure),
                None => self.dispatch_node(node, role, &attempt_params, &context).await,
            };

            let attempt_ended = self.clock.now_unix_millis();
            let llm_param_cost = if llm_param_cost > 0.0 { Some(llm_param_cost) } else { None };
            let llm_param_tokens = if llm_param_tokens > 0 { Some(llm_param_tokens) } else { None };
            let mut node_execution = NodeExecution {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                status: NodeStatus::Running,
                start_time_unix_millis: start,
                end_time_unix_millis: None,
                duration_ms: None,
                attempt,
                max_attempts: policy.max_attempts,
                input: input_value.clone(),
                output: None,
                error: None,
                correlation_id: execution.correlation_id.clone(),
                retry_history: retry_history.clone(),
                metadata: NodeExecutionMetadata::default(),
            };

            match dispatch_result {
                Ok(dispatched) => {
                    let cost_usd = match (dispatched.cost_usd, llm_param_cost) {
                        (None, None) => None,
                        (cost, param_cost) => Some(cost.unwrap_or(0.0) + param_cost.unwrap_or(0.0)),
                    };
                    let tokens_used = match (dispatched.tokens_used, llm_param_tokens) {
                        (None, None) => None,
                        (tokens, param_tokens) => Some(tokens.unwrap_or(0) + param_tokens.unwrap_or(0)),
                    };
                    node_execution.status = NodeStatus::Succeeded;
                    node_execution.output = Some(dispatched.output.clone());
                    node_execution.end_time_unix_millis = Some(attempt_ended);
                    node_execution.duration_ms = Some(attempt_ended - start);
                    node_execution.metadata.cost_usd = cost_usd;
                    node_execution.metadata.tokens_used = tokens_used;
                    node_execution.metadata.cache_hit = dispatched.cache_hit;
                    self.services.audit.record(crate::interfaces::AuditEvent::NodeAttempt {
                        execution_id: execution.execution_id.clone(),
                        node_id: node.id.clone(),
                        attempt,
                    });
                    let _ = self
                        .services
                        .run_log
                        .put_node_execution(&execution.execution_id, &node_execution)
                        .await;
                    return NodeOutcome::Succeeded {
                        output: dispatched.output,
                        duration_ms: attempt_ended - start,
                        cost_usd,
                        tokens_used,
                        cache_hit: dispatched.cache_hit,
                    };
                }
                Err(failure) => {
                    let class = classify(failure.kind, failure.http_status, policy);
                    let decision = decide_retry(policy, attempt, class, failure.retry_after_secs);

                    match decision {
                        RetryDecision::RetryAfterMs(delay_ms) if !cancellation.is_cancelled() => {
                            retry_history.push(RetryAttempt {
                                attempt,
                                started_at_unix_millis: attempt_started,
                                ended_at_unix_millis: attempt_ended,
                                error_kind: failure.kind,
                                error_message: failure.message.clone(),
                                http_status_code: failure.http_status,
                            });
                            node_execution.status = NodeStatus::Retrying;
                            node_execution.error = Some(failure.message.clone());
                            node_execution.retry_history = retry_history.clone();
                            let _ = self
                                .services
                                .run_log
                                .put_node_execution(&execution.execution_id, &node_execution)
                                .await;
                            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                            attempt += 1;
                        }
                        _ => {
                            // `!class.retryable` means this attempt failed terminally
                            // (e.g. BudgetExceeded, SchemaValidationFailed, a validation
                            // error) rather than exhausting retries, so it is surfaced
                            // directly as `Failed` and never parked in the replayable
                            // DLQ. Retries exhausted on an otherwise-retryable error
                            // still move to the DLQ as before.
                            let terminal_non_retryable = !class.retryable;
                            node_execution.status =
                                if terminal_non_retryable { NodeStatus::Failed } else { NodeStatus::Dlq };
                            node_execution.error = Some(failure.message.clone());
                            node_execution.end_time_unix_millis = Some(attempt_ended);
                            node_execution.duration_ms = Some(attempt_ended - start);
                            node_execution.metadata.cancelled = cancellation.is_cancelled();
                            node_execution.retry_history = retry_history.clone();
                            node_execution.metadata.cost_usd = llm_param_cost;
                            node_execution.metadata.tokens_used = llm_param_tokens;

                            if terminal_non_retryable {
                                self.services.audit.record(crate::interfaces::AuditEvent::NodeFailed {
                                    execution_id: execution.execution_id.clone(),
                                    node_id: node.id.clone(),
                                });
                                let _ = self
                                    .services
                                    .run_log
                                    .put_node_execution(&execution.execution_id, &node_execution)
                                    .await;
                                return NodeOutcome::Failed {
                                    duration_ms: attempt_ended - start,
                                    cost_usd: llm_param_cost,
                                    tokens_used: llm_param_tokens,
                                };
                            }

                            self.services.audit.record(crate::interfaces::AuditEvent::NodeDlq {
                                execution_id: execution.execution_id.clone(),
                                node_id: node.id.clone(),
                            });
                            let _ = self
                                .services
                                .run_log
                                .put_node_execution(&execution.execution_id, &node_execution)
                                .await;
                            let dlq_item = crate::model::execution::DlqItem {
                                execution_id: execution.execution_id.clone(),
                                node_id: node.id.clone(),
                                last_error: failure.message,
                                attempts: attempt,
                                first_failed_at_unix_millis: retry_history
                                    .first()
                                    .map_or(attempt_started, |r| r.started_at_unix_millis),
                                last_failed_at_unix_millis: attempt_ended,
                                retryable_after_unix_millis: failure
                                    .retry_after_secs
                                    .map(|secs| attempt_ended + i64::try_from(secs * 1000).unwrap_or(0)),
                                payload: input_value.clone(),
                            };
                            let _ = self.services.run_log.put_dlq_item(&dlq_item).await;
                            return NodeOutcome::Dlq {
                                retry_count: attempt.saturating_sub(1),
                                duration_ms: attempt_ended - start,
                                cost_usd: llm_param_cost,
                                tokens_used: llm_param_tokens,
                            };
                        }
                    }
                }
            }
        }
    }

    /// Dispatches one attempt of a node to the appropriate handler, per the
    /// execution algorithm's step 5.
    async fn dispatch_node(
        &self,
        node: &Node,
        role: NodeRole,
        resolved_params: &BTreeMap<String, Value>,
        context: &ConnectorContext,
    ) -> Result<Dispatched, DispatchFailure> {
        match role {
            NodeRole::Action => {
                let (app_id, op_id) = split_node_type(&node.node_type)
                    .ok_or_else(|| DispatchFailure::validation("malformed action node type"))?;
                let params_value = serde_json::to_value(resolved_params)
                    .map_err(|err| DispatchFailure::validation(err.to_string()))?;
                self.services
                    .connectors
                    .invoke(app_id, op_id, &params_value, &[], context)
                    .await
                    .map(|outcome| Dispatched {
                        output: outcome.output,
                        cost_usd: outcome.cost_usd,
                        tokens_used: outcome.tokens_used,
                        cache_hit: None,
                    })
                    .map_err(|err| DispatchFailure {
                        kind: err.kind(),
                        message: err.to_string(),
                        http_status: match &err {
                            crate::interfaces::ConnectorError::Other { status, .. } => *status,
                            _ => None,
                        },
                        retry_after_secs: match &err {
                            crate::interfaces::ConnectorError::RateLimited { retry_after_secs, .. } => {
                                *retry_after_secs
                            }
                            _ => None,
                        },
                    })
            }
            NodeRole::Transform => {
                let (_, op_id) = split_node_type(&node.node_type)
                    .ok_or_else(|| DispatchFailure::validation("malformed transform node type"))?;
                crate::runtime::handlers::run_transform(op_id, resolved_params)
                    .map(|output| Dispatched { output, cost_usd: None, tokens_used: None, cache_hit: None })
                    .map_err(|err| DispatchFailure::validation(err.to_string()))
            }
            NodeRole::Branch => {
                let (_, op_id) = split_node_type(&node.node_type)
                    .ok_or_else(|| DispatchFailure::validation("malformed branch node type"))?;
                crate::runtime::handlers::run_branch(op_id, resolved_params)
                    .map(|label| Dispatched {
                        output: Value::String(label),
                        cost_usd: None,
                        tokens_used: None,
                        cache_hit: None,
                    })
                    .map_err(|err| DispatchFailure::validation(err.to_string()))
            }
            NodeRole::Llm => {
                let prompt = resolved_params
                    .get("prompt")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let system = resolved_params.get("system").and_then(Value::as_str).map(str::to_string);
                let provider =
                    resolved_params.get("provider").and_then(Value::as_str).unwrap_or("default").to_string();
                let model = resolved_params.get("model").and_then(Value::as_str).unwrap_or("default").to_string();
                let mut messages = Vec::new();
                if let Some(system) = system {
                    messages.push(LlmMessage { role: "system".to_string(), content: system });
                }
                messages.push(LlmMessage { role: "user".to_string(), content: prompt });
                let request = LlmRequest {
                    provider,
                    model,
                    messages,
                    temperature: resolved_params.get("temperature").and_then(Value::as_f64),
                    max_tokens: resolved_params
                        .get("maxTokens")
                        .and_then(Value::as_u64)
                        .and_then(|v| u32::try_from(v).ok()),
                    json_schema: resolved_params.get("jsonSchema").cloned(),
                    user_id: context.user_id.clone(),
                    workflow_id: context.workflow_id.clone(),
                };
                self.services
                    .llm
                    .generate(&request)
                    .await
                    .map(|response| Dispatched {
                        output: response.parsed_json.unwrap_or(Value::String(response.text)),
                        cost_usd: Some(response.cost_usd),
                        tokens_used: Some(
                            response.usage.prompt_tokens + response.usage.completion_tokens,
                        ),
                        cache_hit: Some(response.cache_hit),
                    })
                    .map_err(|err| DispatchFailure {
                        kind: err.kind(),
                        message: err.to_string(),
                        http_status: None,
                        retry_after_secs: match &err {
                            crate::interfaces::LlmProviderError::RateLimited { retry_after_secs, .. } => {
                                *retry_after_secs
                            }
                            _ => None,
                        },
                    })
            }
            NodeRole::Trigger => Err(DispatchFailure::validation("trigger nodes are not dispatched")),
        }
    }

    async fn record_validation_failure(
        &self,
        execution: &Execution,
        node: &Node,
        message: &str,
    ) -> Result<(), RuntimeError> {
        let now = self.clock.now_unix_millis();
        let node_execution = NodeExecution {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            // A param-resolution validation error (unresolved ref, malformed
            // path) is terminal and never produces a replayable DLQItem, so
            // it is surfaced as `Failed` rather than `Dlq`.
            status: NodeStatus::Failed,
            start_time_unix_millis: now,
            end_time_unix_millis: Some(now),
            duration_ms: Some(0),
            attempt: 1,
            max_attempts: 1,
            input: Value::Null,
            output: None,
            error: Some(message.to_string()),
            correlation_id: execution.correlation_id.clone(),
            retry_history: Vec::new(),
            metadata: NodeExecutionMetadata::default(),
        };
        self.services.run_log.put_node_execution(&execution.execution_id, &node_execution).await?;
        Ok(())
    }

    fn finalize_execution(
        &self,
        execution: &mut Execution,
        outputs: &BTreeMap<NodeId, Value>,
        order: &[NodeId],
        llm_node_count: u32,
        llm_cache_hits: u32,
        node_durations_ms: &[i64],
    ) {
        let now = self.clock.now_unix_millis();
        execution.end_time_unix_millis = Some(now);
        execution.duration_ms = Some(now - execution.start_time_unix_millis);

        if execution.status != ExecutionStatus::Failed {
            execution.status = if execution.failed_nodes > 0 {
                if execution.completed_nodes > 0 {
                    ExecutionStatus::Partial
                } else {
                    ExecutionStatus::Failed
                }
            } else {
                ExecutionStatus::Succeeded
            };
        }

        execution.final_output = order
            .last()
            .and_then(|last_id| outputs.get(last_id))
            .cloned()
            .or_else(|| Some(execution.trigger_data.clone()));

        execution.metadata.cache_hit_rate = if llm_node_count > 0 {
            f64::from(llm_cache_hits) / f64::from(llm_node_count)
        } else {
            0.0
        };
        execution.metadata.avg_node_duration_ms = if node_durations_ms.is_empty() {
            0.0
        } else {
            node_durations_ms.iter().sum::<i64>() as f64 / node_durations_ms.len() as f64
        };
    }
}

enum NodeOutcome {
    Succeeded {
        output: Value,
        duration_ms: i64,
        cost_usd: Option<f64>,
        tokens_used: Option<u64>,
        cache_hit: Option<bool>,
    },
    Dlq {
        retry_count: u32,
        duration_ms: i64,
        cost_usd: Option<f64>,
        tokens_used: Option<u64>,
    },
    Failed {
        duration_ms: i64,
        cost_usd: Option<f64>,
        tokens_used: Option<u64>,
    },
}

struct Dispatched {
    output: Value,
    cost_usd: Option<f64>,
    tokens_used: Option<u64>,
    cache_hit: Option<bool>,
}

struct DispatchFailure {
    kind: ErrorKind,
    message: String,
    http_status: Option<u16>,
    retry_after_secs: Option<u64>,
}

impl DispatchFailure {
    fn validation(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Validation, message: message.into(), http_status: None, retry_after_secs: None }
    }
}

/// A deferred `llm`-typed parameter, resolved inside the retry loop rather
/// than synchronously in [`WorkflowRuntime::resolve_params`] so its call to
/// the LLM Call Shell is a proper suspension point whose failures are
/// classified and retried like any other node dispatch.
struct PendingLlmParam {
    provider: String,
    model: String,
    prompt: String,
    system: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    json_schema: Option<Value>,
}

/// Splits a resolved node type (`"{role}.{appId}:{opId}"` or the short form
/// `"{appId}:{opId}"`) into its `(appId, opId)` parts.
fn split_node_type(node_type: &str) -> Option<(&str, &str)> {
    let without_role = node_type.split_once('.').map_or(node_type, |(_, rest)| rest);
    without_role.split_once(':')
}

/// Renders an idempotency key template by substituting `${name}` tokens
/// with this attempt's resolved parameter values.
fn render_idempotency_key(template: &str, resolved_params: &BTreeMap<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in resolved_params {
        let token = format!("${{{name}}}");
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&token, &replacement);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn split_node_type_handles_role_prefixed_form() {
        assert_eq!(split_node_type("action.sheets:append_row"), Some(("sheets", "append_row")));
    }

    #[test]
    fn split_node_type_handles_short_form() {
        assert_eq!(split_node_type("sheets:append_row"), Some(("sheets", "append_row")));
    }

    #[test]
    fn render_idempotency_key_substitutes_tokens() {
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), Value::String("abc".to_string()));
        assert_eq!(render_idempotency_key("order-${id}", &params), "order-abc");
    }

    #[test]
    fn cancellation_token_reports_requested_state() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    proptest! {
        /// Every attempt at the same node reuses the same resolved params
        /// until the attempt succeeds, so the rendered idempotency key must
        /// stay identical across repeated calls — a key that drifted between
        /// retries of one node execution would let a connector's "already
        /// seen this key" guard miss a duplicate side effect entirely.
        #[test]
        fn render_idempotency_key_is_stable_across_repeated_attempts(
            id in "[a-zA-Z0-9_-]{1,16}",
        ) {
            let mut params = BTreeMap::new();
            params.insert("id".to_string(), Value::String(id));
            let template = "order-${id}";
            let first = render_idempotency_key(template, &params);
            let second = render_idempotency_key(template, &params);
            prop_assert_eq!(first, second);
        }
    }
}
