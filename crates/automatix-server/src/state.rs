// automatix-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: The shared, clonable handle axum handlers hold: every
//              wired collaborator plus the runtime and ingress components.
// Purpose: Give handlers one Arc-backed value to extract, instead of
//          threading each collaborator through individually.
// Dependencies: automatix_core, automatix_ingress, automatix_registry, axum
// ============================================================================

//! ## Overview
//! [`ServerState`] is what `serve::run` builds once at startup and clones
//! into every axum handler via `State<ServerState>`. It owns no business
//! logic itself; it is the join point between [`services::build_services`],
//! [`automatix_core::WorkflowRuntime`], [`graphs::WorkflowGraphStore`], and
//! the two Trigger Ingress components.

use std::sync::Arc;

use automatix_core::Clock;
use automatix_core::Services;
use automatix_core::WorkflowRuntime;
use automatix_ingress::PollScheduler;
use automatix_ingress::WebhookIngress;
use automatix_registry::ConnectorRegistry;

use crate::audit::SqliteAuditSink;
use crate::config::AppConfig;
use crate::error::ServerError;
use crate::graphs::WorkflowGraphStore;
use crate::metrics::SnapshotMetricsSink;
use crate::services::build_services;

/// The shared state every HTTP handler operates against.
#[derive(Clone)]
pub struct ServerState {
    /// The runtime configuration this process booted with.
    pub config: Arc<AppConfig>,
    /// The graph executor.
    pub runtime: Arc<WorkflowRuntime>,
    /// The in-memory workflow graph store.
    pub graphs: Arc<WorkflowGraphStore>,
    /// The webhook intake component.
    pub webhooks: Arc<WebhookIngress>,
    /// The polling scheduler.
    pub polls: Arc<PollScheduler>,
    /// The connector registry, for reload and catalog listing endpoints.
    pub registry: Arc<ConnectorRegistry>,
    /// The run-log and DLQ read path, shared with the runtime's own copy.
    pub services: Services,
    /// The audit sink's concrete type, for reading recent audit lines back.
    pub audit: Arc<SqliteAuditSink>,
    /// The metrics sink's concrete type, for a metrics read endpoint.
    pub metrics: Arc<SnapshotMetricsSink>,
    /// The shared clock.
    pub clock: Arc<dyn Clock>,
}

impl ServerState {
    /// Builds the full server state from `config`.
    ///
    /// # Errors
    /// Returns [`ServerError`] if any collaborator fails to construct: see
    /// [`build_services`] and [`WorkflowGraphStore::load`].
    pub fn build(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, ServerError> {
        let built = build_services(&config, clock.clone())?;
        let runtime_config = automatix_core::RuntimeConfig {
            max_parallel_executions: config.runtime.max_parallel_executions,
            max_parallel_nodes_per_execution: config.runtime.max_parallel_nodes_per_execution,
            default_node_timeout_ms: config.runtime.default_node_timeout_ms,
        };
        let runtime =
            Arc::new(WorkflowRuntime::new(built.services.clone(), runtime_config, clock.clone()));
        let graphs = Arc::new(
            WorkflowGraphStore::load(std::path::Path::new(&config.storage.graph_dir))
                .map_err(ServerError::Graphs)?,
        );
        let webhooks = Arc::new(WebhookIngress::new(
            clock.clone(),
            config.webhook.dedupe_window,
            config.webhook.signature_timestamp_tolerance_sec,
        ));
        let polls = Arc::new(PollScheduler::new(
            clock.clone(),
            config.webhook.dedupe_window,
            config.polling.min_interval_sec,
        ));

        Ok(Self {
            config: Arc::new(config),
            runtime,
            graphs,
            webhooks,
            polls,
            registry: built.registry,
            services: built.services,
            audit: built.audit,
            metrics: built.metrics,
            clock,
        })
    }
}
