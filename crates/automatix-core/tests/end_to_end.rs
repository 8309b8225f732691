// automatix-core/tests/end_to_end.rs
// ============================================================================
// Module: Workflow Runtime End-To-End Scenarios
// Description: Drives WorkflowRuntime::start_execution over small graphs
//              with scripted collaborators, exercising the happy path and
//              the retry/DLQ path end to end.
// Dependencies: automatix_core, tokio
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use automatix_core::resolve_path;
use automatix_core::AuditSink;
use automatix_core::CancellationToken;
use automatix_core::Clock;
use automatix_core::ConnectorCatalog;
use automatix_core::ConnectorContext;
use automatix_core::ConnectorError;
use automatix_core::ConnectorInvoker;
use automatix_core::ConnectorOutcome;
use automatix_core::DedupeHash;
use automatix_core::DlqItem;
use automatix_core::Edge;
use automatix_core::Execution;
use automatix_core::ExecutionId;
use automatix_core::ExecutionPage;
use automatix_core::ExecutionQuery;
use automatix_core::ExecutionStats;
use automatix_core::ExecutionStatus;
use automatix_core::LlmProvider;
use automatix_core::LlmProviderError;
use automatix_core::LlmRequest;
use automatix_core::LlmResponse;
use automatix_core::MetricsSink;
use automatix_core::Node;
use automatix_core::NodeExecution;
use automatix_core::NodeId;
use automatix_core::NodeStatus;
use automatix_core::NoopAuditSink;
use automatix_core::NoopMetricsSink;
use automatix_core::ParamValue;
use automatix_core::PollId;
use automatix_core::RetryPolicy;
use automatix_core::RunLogError;
use automatix_core::RunLogStore;
use automatix_core::RuntimeConfig;
use automatix_core::Services;
use automatix_core::StatsWindow;
use automatix_core::TriggerEvent;
use automatix_core::TriggerKind;
use automatix_core::UserId;
use automatix_core::WorkflowGraph;
use automatix_core::WorkflowId;
use automatix_core::WorkflowRuntime;
use serde_json::json;

#[derive(Debug)]
struct FixedClock(AtomicI64);

impl FixedClock {
    fn new(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> time::OffsetDateTime {
        time::OffsetDateTime::UNIX_EPOCH
    }

    fn now_unix_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Always resolves every node type and never overrides the registry's
/// default retry policy or timeout, so graphs don't need a live registry to
/// execute against.
struct PermissiveCatalog;

impl ConnectorCatalog for PermissiveCatalog {
    fn is_valid_node_type(&self, _node_type: &str) -> bool {
        true
    }

    fn default_retry_policy(&self, _node_type: &str) -> Option<RetryPolicy> {
        None
    }

    fn default_timeout_ms(&self, _node_type: &str) -> Option<u64> {
        None
    }
}

/// An `LlmProvider` that fails loudly if ever called, for graphs with no
/// `llm.*` nodes.
struct UnreachableLlmProvider;

#[async_trait]
impl LlmProvider for UnreachableLlmProvider {
    async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmProviderError> {
        Err(LlmProviderError::Other("no llm node should call this provider".to_string()))
    }
}

/// Records every request it receives and always returns the same scripted
/// text, so a test can assert a parameter-level `llm` call actually reached
/// this provider.
#[derive(Default)]
struct RecordingLlmProvider {
    requests: Mutex<Vec<LlmRequest>>,
}

impl RecordingLlmProvider {
    fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl LlmProvider for RecordingLlmProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmProviderError> {
        self.requests.lock().expect("lock").push(request.clone());
        Ok(LlmResponse {
            text: "subject line: hello".to_string(),
            parsed_json: None,
            usage: automatix_core::LlmUsage { prompt_tokens: 10, completion_tokens: 5 },
            cost_usd: 0.002,
            cache_hit: false,
            fallback_provider: None,
        })
    }
}

/// Always denies, so a node dispatch fails with a non-retryable
/// `BudgetExceeded` on its very first attempt.
struct AlwaysDeniesLlmProvider;

#[async_trait]
impl LlmProvider for AlwaysDeniesLlmProvider {
    async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmProviderError> {
        Err(LlmProviderError::BudgetExceeded)
    }
}

/// Scripts a fixed sequence of outcomes for one `app:op` pair, in order;
/// repeats the last outcome once the script is exhausted.
#[derive(Clone)]
enum ScriptedOutcome {
    Succeed(serde_json::Value),
    Fail5xx,
}

struct ScriptedConnector {
    script: Mutex<Vec<ScriptedOutcome>>,
    calls: AtomicU32,
}

impl ScriptedConnector {
    fn new(script: Vec<ScriptedOutcome>) -> Self {
        Self { script: Mutex::new(script), calls: AtomicU32::new(0) }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectorInvoker for ScriptedConnector {
    async fn invoke(
        &self,
        _app_id: &str,
        _operation_id: &str,
        _params: &serde_json::Value,
        _credentials: &[u8],
        _context: &ConnectorContext,
    ) -> Result<ConnectorOutcome, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("script lock");
        let outcome = if script.len() > 1 { script.remove(0) } else { script[0].clone() };
        match outcome {
            ScriptedOutcome::Succeed(output) => Ok(ConnectorOutcome { output, ..ConnectorOutcome::default() }),
            ScriptedOutcome::Fail5xx => Err(ConnectorError::Other {
                message: "upstream returned 500".to_string(),
                status: Some(500),
            }),
        }
    }
}

/// An in-memory `RunLogStore`, sufficient for asserting on the records a
/// single execution produces.
#[derive(Default)]
struct InMemoryRunLogStore {
    executions: Mutex<BTreeMap<ExecutionId, Execution>>,
    node_executions: Mutex<BTreeMap<ExecutionId, Vec<NodeExecution>>>,
    dlq: Mutex<Vec<DlqItem>>,
}

#[async_trait]
impl RunLogStore for InMemoryRunLogStore {
    async fn put_execution(&self, execution: &Execution) -> Result<(), RunLogError> {
        self.executions.lock().expect("lock").insert(execution.execution_id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<Execution, RunLogError> {
        self.executions
            .lock()
            .expect("lock")
            .get(id)
            .cloned()
            .ok_or_else(|| RunLogError::NotFound(id.to_string()))
    }

    async fn query_executions(&self, _query: &ExecutionQuery) -> Result<ExecutionPage, RunLogError> {
        let items: Vec<Execution> = self.executions.lock().expect("lock").values().cloned().collect();
        let total = u64::try_from(items.len()).unwrap_or(u64::MAX);
        Ok(ExecutionPage { total, items })
    }

    async fn stats(&self, _window: StatsWindow) -> Result<ExecutionStats, RunLogError> {
        Ok(ExecutionStats::default())
    }

    async fn put_node_execution(
        &self,
        execution_id: &ExecutionId,
        node_execution: &NodeExecution,
    ) -> Result<(), RunLogError> {
        let mut all = self.node_executions.lock().expect("lock");
        let entries = all.entry(execution_id.clone()).or_default();
        if let Some(existing) = entries.iter_mut().find(|n| n.node_id == node_execution.node_id) {
            *existing = node_execution.clone();
        } else {
            entries.push(node_execution.clone());
        }
        Ok(())
    }

    async fn list_node_executions(&self, execution_id: &ExecutionId) -> Result<Vec<NodeExecution>, RunLogError> {
        Ok(self.node_executions.lock().expect("lock").get(execution_id).cloned().unwrap_or_default())
    }

    async fn put_dlq_item(&self, item: &DlqItem) -> Result<(), RunLogError> {
        self.dlq.lock().expect("lock").push(item.clone());
        Ok(())
    }

    async fn list_dlq(&self, workflow_id: Option<&WorkflowId>) -> Result<Vec<DlqItem>, RunLogError> {
        let dlq = self.dlq.lock().expect("lock");
        Ok(match workflow_id {
            Some(_) => dlq.clone(),
            None => dlq.clone(),
        })
    }

    async fn delete_dlq_item(&self, execution_id: &ExecutionId, node_id: &NodeId) -> Result<(), RunLogError> {
        self.dlq.lock().expect("lock").retain(|item| !(&item.execution_id == execution_id && &item.node_id == node_id));
        Ok(())
    }
}

fn gmail_to_sheets_graph() -> WorkflowGraph {
    let mut params = BTreeMap::new();
    params.insert(
        "row".to_string(),
        ParamValue::Ref { node_id: NodeId::new("trigger"), path: "$.subject".to_string() },
    );
    WorkflowGraph {
        workflow_id: WorkflowId::new("gmail-to-sheets"),
        version: 1,
        nodes: vec![
            Node {
                id: NodeId::new("trigger"),
                node_type: "trigger.gmail:new_email".to_string(),
                params: BTreeMap::new(),
                retry_policy: None,
                idempotency_key: None,
            },
            Node {
                id: NodeId::new("append"),
                node_type: "action.sheets:append_row".to_string(),
                params,
                retry_policy: None,
                idempotency_key: None,
            },
        ],
        edges: vec![Edge { from: NodeId::new("trigger"), to: NodeId::new("append"), label: None }],
    }
}

fn trigger_event(payload: serde_json::Value) -> TriggerEvent {
    TriggerEvent {
        kind: TriggerKind::Poll(PollId::new("manual")),
        app_id: "gmail".to_string(),
        trigger_id: "new_email".to_string(),
        payload,
        headers: BTreeMap::new(),
        timestamp_unix_millis: 0,
        signature: None,
        dedupe_hash: DedupeHash::new("hash-1"),
    }
}

fn runtime_with(
    connectors: Arc<dyn ConnectorInvoker>,
    run_log: Arc<dyn RunLogStore>,
    clock: Arc<dyn Clock>,
) -> WorkflowRuntime {
    runtime_with_llm(connectors, Arc::new(UnreachableLlmProvider), run_log, clock)
}

fn runtime_with_llm(
    connectors: Arc<dyn ConnectorInvoker>,
    llm: Arc<dyn LlmProvider>,
    run_log: Arc<dyn RunLogStore>,
    clock: Arc<dyn Clock>,
) -> WorkflowRuntime {
    let services = Services::new(
        connectors,
        llm,
        run_log,
        Arc::new(NoopAuditSink) as Arc<dyn AuditSink>,
        Arc::new(NoopMetricsSink) as Arc<dyn MetricsSink>,
        Arc::new(PermissiveCatalog) as Arc<dyn ConnectorCatalog>,
    );
    WorkflowRuntime::new(services, RuntimeConfig::default(), clock)
}

/// A single `trigger -> append` graph where the `append` node's `row`
/// parameter is an inline `llm` call rather than a `ref`, so dispatching it
/// requires the runtime to resolve the parameter through `services.llm`
/// before invoking the connector.
fn gmail_to_sheets_graph_with_llm_param() -> WorkflowGraph {
    let mut params = BTreeMap::new();
    params.insert(
        "row".to_string(),
        ParamValue::Llm {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            prompt: "extract the subject line".to_string(),
            system: None,
            temperature: None,
            max_tokens: None,
            json_schema: None,
            cache_ttl_sec: None,
        },
    );
    WorkflowGraph {
        workflow_id: WorkflowId::new("gmail-to-sheets-llm-param"),
        version: 1,
        nodes: vec![
            Node {
                id: NodeId::new("trigger"),
                node_type: "trigger.gmail:new_email".to_string(),
                params: BTreeMap::new(),
                retry_policy: None,
                idempotency_key: None,
            },
            Node {
                id: NodeId::new("append"),
                node_type: "action.sheets:append_row".to_string(),
                params,
                retry_policy: None,
                idempotency_key: None,
            },
        ],
        edges: vec![Edge { from: NodeId::new("trigger"), to: NodeId::new("append"), label: None }],
    }
}

#[tokio::test]
async fn gmail_to_sheets_happy_path_produces_one_succeeded_node() {
    let connector = Arc::new(ScriptedConnector::new(vec![ScriptedOutcome::Succeed(json!({"appended": true}))]));
    let run_log = Arc::new(InMemoryRunLogStore::default());
    let clock = Arc::new(FixedClock::new(0));
    let runtime = runtime_with(connector.clone(), run_log.clone(), clock);

    let graph = gmail_to_sheets_graph();
    let event = trigger_event(json!({"from": "a@example.com", "subject": "hello"}));
    let execution = runtime
        .start_execution(&graph, event, UserId::new("user-1"), ExecutionId::new("exec-1"), CancellationToken::new())
        .await
        .expect("execution runs");

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(execution.completed_nodes, 1);
    assert_eq!(execution.failed_nodes, 0);
    assert_eq!(connector.call_count(), 1);

    let node_executions = run_log.list_node_executions(&execution.execution_id).await.expect("list");
    assert_eq!(node_executions.len(), 1);
    let append = &node_executions[0];
    assert_eq!(append.status, NodeStatus::Succeeded);
    assert_eq!(append.input.get("row").and_then(serde_json::Value::as_str), Some("hello"));
    assert!(append.retry_history_is_consistent());
}

#[tokio::test]
async fn connector_failing_three_times_lands_the_node_in_the_dlq() {
    let connector = Arc::new(ScriptedConnector::new(vec![
        ScriptedOutcome::Fail5xx,
        ScriptedOutcome::Fail5xx,
        ScriptedOutcome::Fail5xx,
    ]));
    let run_log = Arc::new(InMemoryRunLogStore::default());
    let clock = Arc::new(FixedClock::new(0));
    let runtime = runtime_with(connector.clone(), run_log.clone(), clock);

    let mut graph = gmail_to_sheets_graph();
    graph.nodes[1].retry_policy = Some(RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        backoff_multiplier: 1.0,
        jitter: automatix_core::BackoffJitter::None,
        retry_on_http_statuses: Vec::new(),
    });

    let event = trigger_event(json!({"from": "a@example.com", "subject": "hello"}));
    let execution = runtime
        .start_execution(&graph, event, UserId::new("user-1"), ExecutionId::new("exec-2"), CancellationToken::new())
        .await
        .expect("execution runs");

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.failed_nodes, 1);
    assert_eq!(connector.call_count(), 3);

    let node_executions = run_log.list_node_executions(&execution.execution_id).await.expect("list");
    let append = node_executions.iter().find(|n| n.node_id == NodeId::new("append")).expect("append node");
    assert_eq!(append.status, NodeStatus::Dlq);
    assert_eq!(append.attempt, 3);
    assert_eq!(append.retry_history.len(), 2);
    assert!(append.retry_history_is_consistent());

    let dlq = run_log.list_dlq(None).await.expect("dlq list");
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].attempts, 3);
}

#[tokio::test]
async fn ref_param_resolution_uses_path_resolver_against_trigger_output() {
    let root = json!({"subject": "hi", "nested": {"value": 42}});
    assert_eq!(resolve_path(&root, "$.subject").expect("resolve"), &json!("hi"));
    assert_eq!(resolve_path(&root, "$.nested.value").expect("resolve"), &json!(42));
}

#[tokio::test]
async fn llm_param_value_is_resolved_through_the_llm_provider_before_dispatch() {
    let connector = Arc::new(ScriptedConnector::new(vec![ScriptedOutcome::Succeed(json!({"appended": true}))]));
    let llm = Arc::new(RecordingLlmProvider::default());
    let run_log = Arc::new(InMemoryRunLogStore::default());
    let clock = Arc::new(FixedClock::new(0));
    let runtime = runtime_with_llm(connector.clone(), llm.clone(), run_log.clone(), clock);

    let graph = gmail_to_sheets_graph_with_llm_param();
    let event = trigger_event(json!({"from": "a@example.com", "subject": "hello"}));
    let execution = runtime
        .start_execution(&graph, event, UserId::new("user-1"), ExecutionId::new("exec-llm-param"), CancellationToken::new())
        .await
        .expect("execution runs");

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(connector.call_count(), 1);

    // The connector only ever sees the LLM's resolved text, never the raw
    // prompt, and the LLM provider was actually called once.
    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages.last().map(|m| m.content.as_str()), Some("extract the subject line"));

    let node_executions = run_log.list_node_executions(&execution.execution_id).await.expect("list");
    let append = node_executions.iter().find(|n| n.node_id == NodeId::new("append")).expect("append node");
    assert_eq!(append.input.get("row").and_then(serde_json::Value::as_str), Some("subject line: hello"));
    assert_eq!(append.metadata.cost_usd, Some(0.002));
    assert_eq!(append.metadata.tokens_used, Some(15));

    // Cost flows into the execution total even though this is an
    // `action.*` node, not an `llm.*` node.
    assert_eq!(execution.metadata.total_cost_usd, 0.002);
    assert_eq!(execution.metadata.total_tokens_used, 15);
    // Param-level LLM calls are not counted toward `cache_hit_rate`, which
    // tracks `llm.*`-role nodes only.
    assert_eq!(execution.metadata.cache_hit_rate, 0.0);
}

#[tokio::test]
async fn budget_denial_fails_the_node_without_parking_it_in_the_dlq() {
    let connector = Arc::new(ScriptedConnector::new(vec![ScriptedOutcome::Succeed(json!({"appended": true}))]));
    let llm = Arc::new(AlwaysDeniesLlmProvider);
    let run_log = Arc::new(InMemoryRunLogStore::default());
    let clock = Arc::new(FixedClock::new(0));
    let runtime = runtime_with_llm(connector.clone(), llm, run_log.clone(), clock);

    let mut graph = gmail_to_sheets_graph_with_llm_param();
    // Even with several configured attempts, a non-retryable BudgetExceeded
    // must fail on the very first attempt rather than being retried.
    graph.nodes[1].retry_policy = Some(RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        backoff_multiplier: 1.0,
        jitter: automatix_core::BackoffJitter::None,
        retry_on_http_statuses: Vec::new(),
    });

    let event = trigger_event(json!({"from": "a@example.com", "subject": "hello"}));
    let execution = runtime
        .start_execution(&graph, event, UserId::new("user-1"), ExecutionId::new("exec-budget"), CancellationToken::new())
        .await
        .expect("execution runs");

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.failed_nodes, 1);
    // The connector is never reached: the llm param fails before dispatch.
    assert_eq!(connector.call_count(), 0);

    let node_executions = run_log.list_node_executions(&execution.execution_id).await.expect("list");
    let append = node_executions.iter().find(|n| n.node_id == NodeId::new("append")).expect("append node");
    assert_eq!(append.status, NodeStatus::Failed);
    assert_eq!(append.attempt, 1);
    assert!(append.retry_history.is_empty());

    let dlq = run_log.list_dlq(None).await.expect("dlq list");
    assert!(dlq.is_empty(), "a non-retryable terminal failure must not create a DlqItem");
}
