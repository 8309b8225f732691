// automatix-core/src/interfaces.rs
// ============================================================================
// Module: Automatix Interfaces
// Description: Trait boundaries the Workflow Runtime is built against,
//              composed into a single Services struct for dependency
//              injection.
// Purpose: Replace singletons with explicit construction; every collaborator
//          the runtime needs is a trait object passed in at construction
//          time, never a global.
// Dependencies: async_trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The runtime never constructs its own collaborators. A [`Services`]
//! struct bundles the trait objects it needs (connector invocation, LLM
//! generation, run-log persistence, audit, metrics) and is passed into
//! [`crate::runtime::engine::WorkflowRuntime::new`] explicitly. Tests
//! construct their own `Services` with in-memory or stub implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::error::ErrorKind;
use crate::model::execution::DlqItem;
use crate::model::execution::Execution;
use crate::model::execution::NodeExecution;
use crate::model::identifiers::CorrelationId;
use crate::model::identifiers::ExecutionId;
use crate::model::identifiers::NodeId;
use crate::model::identifiers::WorkflowId;
use crate::model::retry::RetryPolicy;

// ============================================================================
// SECTION: Connector Invocation
// ============================================================================

/// Context propagated into a connector invocation.
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    /// The owning execution's correlation id.
    pub correlation_id: CorrelationId,
    /// The owning execution's id.
    pub execution_id: ExecutionId,
    /// The node id being invoked.
    pub node_id: NodeId,
    /// The workflow this execution is a run of.
    pub workflow_id: String,
    /// The tenant user this execution runs on behalf of; connector invokers
    /// use this to resolve credentials out of band.
    pub user_id: String,
    /// The deadline for this call, in unix-millis.
    pub deadline_unix_millis: i64,
}

/// The result of a successful connector invocation.
#[derive(Debug, Clone, Default)]
pub struct ConnectorOutcome {
    /// The operation's output value.
    pub output: Value,
    /// Cost incurred, in USD, if the connector reports billing.
    pub cost_usd: Option<f64>,
    /// Tokens consumed, if applicable (rare for non-LLM connectors).
    pub tokens_used: Option<u64>,
    /// The HTTP status code of the underlying call, if applicable.
    pub http_status_code: Option<u16>,
    /// Response headers of interest (e.g. `retry-after`).
    pub headers: BTreeMap<String, String>,
}

/// Errors a connector invocation can raise.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The credential bag was missing, expired, or rejected by upstream.
    #[error("credential error: {0}")]
    Credential(String),
    /// Upstream rate-limited the call.
    #[error("rate limited{retry_after_secs:?}: {message}")]
    RateLimited {
        /// A message describing the rate limit.
        message: String,
        /// The `Retry-After` value, in seconds, if the upstream provided one.
        retry_after_secs: Option<u64>,
    },
    /// A transient transport failure (network, DNS, 5xx).
    #[error("transient transport error: {0}")]
    Transient(String),
    /// The call exceeded its deadline.
    #[error("timeout")]
    Timeout,
    /// Any other upstream failure, carrying the raw HTTP status if known.
    #[error("connector error (status {status:?}): {message}")]
    Other {
        /// A message describing the failure.
        message: String,
        /// The HTTP status code, if the failure came from an HTTP call.
        status: Option<u16>,
    },
}

impl ConnectorError {
    /// Classifies this connector error into the shared error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Credential(_) => ErrorKind::Credential,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient(_) => ErrorKind::TransientTransport,
            Self::Timeout => ErrorKind::Timeout,
            Self::Other { .. } => ErrorKind::Internal,
        }
    }
}

/// The single interface the Workflow Runtime uses to invoke connector
/// operations, per the platform's connector invocation boundary.
///
/// `credentials` is an opaque byte bag decrypted by a credential service
/// that is out of scope for this crate.
#[async_trait]
pub trait ConnectorInvoker: Send + Sync {
    /// Invokes `app_id:operation_id` with the given resolved parameters.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] classified per the shared error taxonomy.
    async fn invoke(
        &self,
        app_id: &str,
        operation_id: &str,
        params: &Value,
        credentials: &[u8],
        context: &ConnectorContext,
    ) -> Result<ConnectorOutcome, ConnectorError>;
}

// ============================================================================
// SECTION: LLM Provider Boundary
// ============================================================================

/// A request to the LLM provider boundary (below the fingerprint cache,
/// budget gate, and repair loop the LLM Call Shell adds).
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The provider identifier.
    pub provider: String,
    /// The model identifier.
    pub model: String,
    /// Chat-style messages, in order.
    pub messages: Vec<LlmMessage>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// JSON Schema the response should conform to, if set.
    pub json_schema: Option<Value>,
    /// The tenant user this call is billed to. Not part of the cache
    /// fingerprint; carried so the LLM Call Shell's budget gate can
    /// enforce a per-user cap.
    pub user_id: String,
    /// The workflow this call runs within. Not part of the cache
    /// fingerprint.
    pub workflow_id: String,
}

/// A single chat message.
#[derive(Debug, Clone)]
pub struct LlmMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// The message content.
    pub content: String,
}

/// Token usage reported by an LLM provider call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens consumed by the completion.
    pub completion_tokens: u64,
}

/// The response from the LLM provider boundary.
///
/// A raw, uncached provider always reports `cache_hit: false` and
/// `parsed_json: None`; the LLM Call Shell (in `automatix-llm`), which
/// itself implements [`LlmProvider`] by wrapping an inner raw provider,
/// populates both fields when it serves from its fingerprint cache or
/// performs validate-and-repair.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// The text parsed as JSON and validated against the request's
    /// `json_schema`, when one was set and validation succeeded.
    pub parsed_json: Option<Value>,
    /// Token usage for this call.
    pub usage: LlmUsage,
    /// The cost of this call, in USD. Zero for cache hits.
    pub cost_usd: f64,
    /// Whether this response was served from the fingerprint cache.
    pub cache_hit: bool,
    /// The provider that actually served this call, when the shell's
    /// fallback list was consulted because the requested provider was
    /// unreachable. `None` when the requested provider served the call
    /// directly.
    pub fallback_provider: Option<String>,
}

/// Errors the LLM provider boundary can raise.
#[derive(Debug, Error)]
pub enum LlmProviderError {
    /// The provider or model is unknown or unreachable.
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    /// Upstream rate-limited the call.
    #[error("rate limited{retry_after_secs:?}: {message}")]
    RateLimited {
        /// A message describing the rate limit.
        message: String,
        /// The `Retry-After` value, in seconds, if the upstream provided one.
        retry_after_secs: Option<u64>,
    },
    /// The call exceeded its deadline.
    #[error("timeout")]
    Timeout,
    /// Any other upstream failure.
    #[error("provider error: {0}")]
    Other(String),
    /// The LLM Call Shell's budget gate denied this call before it reached
    /// upstream. Raised only by the shell, never by a raw provider.
    #[error("budget exceeded")]
    BudgetExceeded,
    /// The response failed schema validation even after one repair
    /// round-trip. Raised only by the shell, never by a raw provider.
    #[error("schema validation failed: {0}")]
    SchemaValidationFailed(String),
}

impl LlmProviderError {
    /// Classifies this error into the shared error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) => ErrorKind::TransientTransport,
            Self::Other(_) => ErrorKind::Internal,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Timeout => ErrorKind::Timeout,
            Self::BudgetExceeded => ErrorKind::BudgetExceeded,
            Self::SchemaValidationFailed(_) => ErrorKind::SchemaValidationFailed,
        }
    }
}

/// The raw LLM provider boundary: `generate`. The LLM Call Shell (in
/// `automatix-llm`) wraps an implementation of this trait and adds caching,
/// budget enforcement, and validate-and-repair.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Issues one generation call upstream with no caching or budget
    /// enforcement.
    ///
    /// # Errors
    /// Returns [`LlmProviderError`] classified per the shared error
    /// taxonomy.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmProviderError>;
}

// ============================================================================
// SECTION: Run Log Store
// ============================================================================

/// Errors raised by the run-log store.
#[derive(Debug, Error)]
pub enum RunLogError {
    /// The underlying storage engine failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A stored record failed integrity validation on read.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Filter and pagination parameters for `query_executions`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQuery {
    /// Restrict to a specific execution id.
    pub execution_id: Option<ExecutionId>,
    /// Restrict to a specific workflow id.
    pub workflow_id: Option<WorkflowId>,
    /// Restrict to a specific user id.
    pub user_id: Option<String>,
    /// Restrict to a specific execution status (as its serialized name).
    pub status: Option<String>,
    /// Only include executions started at or after this unix-millis
    /// timestamp.
    pub since_unix_millis: Option<i64>,
    /// Only include executions started at or before this unix-millis
    /// timestamp.
    pub until_unix_millis: Option<i64>,
    /// Field to sort by (`"startTime"` or `"duration"`).
    pub sort_by: Option<String>,
    /// `"asc"` or `"desc"`.
    pub sort_order: Option<String>,
    /// Maximum number of results.
    pub limit: u32,
    /// Offset into the result set.
    pub offset: u32,
}

/// A page of query results plus the total matching count.
#[derive(Debug, Clone)]
pub struct ExecutionPage {
    /// The page of matching executions.
    pub items: Vec<Execution>,
    /// The total number of executions matching the query, ignoring
    /// pagination.
    pub total: u64,
}

/// Aggregate statistics over a time window.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// Total executions in the window.
    pub total: u64,
    /// Executions that succeeded.
    pub succeeded: u64,
    /// Executions that failed.
    pub failed: u64,
    /// Executions that ended partial.
    pub partial: u64,
    /// Mean duration, in milliseconds.
    pub avg_duration_ms: f64,
    /// 50th percentile duration, in milliseconds.
    pub p50_ms: f64,
    /// 95th percentile duration, in milliseconds.
    pub p95_ms: f64,
    /// 99th percentile duration, in milliseconds.
    pub p99_ms: f64,
    /// Total LLM cost across the window, in USD.
    pub total_cost_usd: f64,
    /// Fraction of LLM nodes that were cache hits.
    pub cache_hit_rate: f64,
}

/// The statistics window granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsWindow {
    /// The last hour.
    Hour,
    /// The last day.
    Day,
    /// The last week.
    Week,
}

/// The persistence boundary the Workflow Runtime and Run Observability share.
///
/// Implementations must make writes idempotent on primary key (re-upserting
/// the same `Execution` or `NodeExecution` must not create a duplicate),
/// per the platform's concurrency model.
#[async_trait]
pub trait RunLogStore: Send + Sync {
    /// Upserts an execution record.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the write fails.
    async fn put_execution(&self, execution: &Execution) -> Result<(), RunLogError>;

    /// Fetches an execution by id.
    ///
    /// # Errors
    /// Returns [`RunLogError::NotFound`] if no such execution exists, or
    /// another [`RunLogError`] on storage failure.
    async fn get_execution(&self, id: &ExecutionId) -> Result<Execution, RunLogError>;

    /// Runs a filtered, paginated query over executions.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the query fails.
    async fn query_executions(&self, query: &ExecutionQuery) -> Result<ExecutionPage, RunLogError>;

    /// Computes aggregate statistics over the given window.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the computation fails.
    async fn stats(&self, window: StatsWindow) -> Result<ExecutionStats, RunLogError>;

    /// Upserts a node execution record.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the write fails.
    async fn put_node_execution(
        &self,
        execution_id: &ExecutionId,
        node_execution: &NodeExecution,
    ) -> Result<(), RunLogError>;

    /// Fetches the node execution records for an execution, in node order.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the read fails.
    async fn list_node_executions(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Vec<NodeExecution>, RunLogError>;

    /// Inserts or replaces a DLQ item.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the write fails.
    async fn put_dlq_item(&self, item: &DlqItem) -> Result<(), RunLogError>;

    /// Lists DLQ items, optionally restricted to one workflow.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the read fails.
    async fn list_dlq(&self, workflow_id: Option<&WorkflowId>) -> Result<Vec<DlqItem>, RunLogError>;

    /// Removes a DLQ item, called after a successful manual replay.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the write fails.
    async fn delete_dlq_item(
        &self,
        execution_id: &ExecutionId,
        node_id: &NodeId,
    ) -> Result<(), RunLogError>;
}

// ============================================================================
// SECTION: Audit & Metrics
// ============================================================================

/// A log-worthy event the runtime or ingress records.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// A webhook delivery passed verification and dedupe.
    WebhookAccepted {
        /// The execution-scoped correlation id.
        correlation_id: CorrelationId,
    },
    /// A webhook delivery was rejected (signature failure or duplicate).
    WebhookRejected {
        /// A short reason string.
        reason: String,
    },
    /// An execution was created.
    ExecutionStarted {
        /// The new execution's id.
        execution_id: ExecutionId,
    },
    /// An execution reached a terminal status.
    ExecutionFinished {
        /// The execution's id.
        execution_id: ExecutionId,
        /// The terminal status, as its serialized name.
        status: String,
    },
    /// A node attempt completed (successfully or not).
    NodeAttempt {
        /// The owning execution's id.
        execution_id: ExecutionId,
        /// The node id.
        node_id: NodeId,
        /// The attempt number.
        attempt: u32,
    },
    /// A node moved to the DLQ.
    NodeDlq {
        /// The owning execution's id.
        execution_id: ExecutionId,
        /// The node id.
        node_id: NodeId,
    },
    /// A node failed terminally without exhausting retries (e.g.
    /// `BudgetExceeded`, `SchemaValidationFailed`) and was never parked in
    /// the DLQ.
    NodeFailed {
        /// The owning execution's id.
        execution_id: ExecutionId,
        /// The node id.
        node_id: NodeId,
    },
    /// The connector registry was reloaded.
    RegistryReloaded {
        /// Number of connectors successfully loaded.
        connector_count: usize,
    },
}

/// Receives audit events. Implementations must not block the caller for
/// long; a slow sink should buffer internally.
pub trait AuditSink: Send + Sync {
    /// Records one audit event.
    fn record(&self, event: AuditEvent);
}

/// A no-op audit sink, used by default and in tests.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Receives counter/gauge-shaped metrics. This is a trait seam, not a
/// Prometheus exporter; implementations decide how (or whether) to expose
/// the data externally.
pub trait MetricsSink: Send + Sync {
    /// Increments a named counter by `value`.
    fn increment_counter(&self, name: &str, value: u64);

    /// Sets a named gauge to `value`.
    fn set_gauge(&self, name: &str, value: f64);
}

/// A no-op metrics sink, used by default and in tests.
#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment_counter(&self, _name: &str, _value: u64) {}
    fn set_gauge(&self, _name: &str, _value: f64) {}
}

// ============================================================================
// SECTION: Connector Catalog (Registry Boundary)
// ============================================================================

/// The subset of the Connector Registry the Workflow Runtime depends on.
///
/// `automatix-registry` implements this for its live, reloadable catalog;
/// the runtime crate does not depend on the registry crate directly so that
/// the dependency points the other way (registry depends on core's types,
/// not the reverse).
pub trait ConnectorCatalog: Send + Sync {
    /// Whether `node_type` resolves to a known connector operation.
    fn is_valid_node_type(&self, node_type: &str) -> bool;

    /// The default retry policy for `node_type`, if the registry defines
    /// one; `None` falls back to [`RetryPolicy::default`].
    fn default_retry_policy(&self, node_type: &str) -> Option<RetryPolicy>;

    /// The default timeout, in milliseconds, for `node_type`; `None` falls
    /// back to the runtime's configured `default_node_timeout_ms`.
    fn default_timeout_ms(&self, node_type: &str) -> Option<u64>;
}

// ============================================================================
// SECTION: Services
// ============================================================================

/// The runtime's full set of collaborators, constructed explicitly and
/// passed in — never reached for as a singleton.
#[derive(Clone)]
pub struct Services {
    /// The connector invocation boundary.
    pub connectors: Arc<dyn ConnectorInvoker>,
    /// The LLM provider boundary (wrapped by the LLM Call Shell upstream of
    /// this field; the runtime calls through the shell, not this directly,
    /// when a node's role is `Llm`).
    pub llm: Arc<dyn LlmProvider>,
    /// The run-log persistence boundary.
    pub run_log: Arc<dyn RunLogStore>,
    /// The audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// The metrics sink.
    pub metrics: Arc<dyn MetricsSink>,
    /// The connector registry boundary.
    pub registry: Arc<dyn ConnectorCatalog>,
}

impl Services {
    /// Builds a `Services` bundle from explicit collaborators.
    #[must_use]
    pub fn new(
        connectors: Arc<dyn ConnectorInvoker>,
        llm: Arc<dyn LlmProvider>,
        run_log: Arc<dyn RunLogStore>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn MetricsSink>,
        registry: Arc<dyn ConnectorCatalog>,
    ) -> Self {
        Self { connectors, llm, run_log, audit, metrics, registry }
    }
}
