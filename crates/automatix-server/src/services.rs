// automatix-server/src/services.rs
// ============================================================================
// Module: Services Wiring
// Description: Constructs an automatix_core::Services bundle from AppConfig,
//              with no singletons or global statics.
// Purpose: The single place that decides which concrete implementation
//          backs each of the runtime's trait-object collaborators.
// Dependencies: automatix_core, automatix_connectors, automatix_llm,
//               automatix_registry, automatix_store_sqlite
// ============================================================================

//! ## Overview
//! [`build_services`] is the platform's explicit-construction-over-singleton
//! wiring point: every collaborator the Workflow Runtime needs is built
//! here, once, from [`AppConfig`], and handed to the runtime through a
//! [`Services`] value rather than reached for through a global. A real
//! upstream LLM provider SDK is out of scope; [`StubLlmProvider`] stands in
//! as the shell's wrapped provider, same as it does in this workspace's
//! integration tests.

use std::path::Path;
use std::sync::Arc;

use automatix_connectors::CompositeConnectorInvoker;
use automatix_connectors::HttpActionConfig;
use automatix_connectors::HttpActionInvoker;
use automatix_connectors::StubConnectorInvoker;
use automatix_core::Clock;
use automatix_core::ConnectorCatalog;
use automatix_core::ConnectorError;
use automatix_core::Services;
use automatix_llm::InMemoryBudgetGate;
use automatix_llm::LlmCallShell;
use automatix_llm::StubLlmProvider;
use automatix_registry::ConnectorRegistry;
use automatix_store_sqlite::SqliteRunLogStore;

use crate::audit::SqliteAuditSink;
use crate::config::AppConfig;
use crate::error::ServerError;
use crate::metrics::SnapshotMetricsSink;

/// Builds a full [`Services`] bundle plus the registry and audit sink
/// handles callers need directly (for registry reload and audit queries,
/// neither of which flows through a trait object).
pub struct BuiltServices {
    /// The assembled collaborator bundle for [`automatix_core::WorkflowRuntime`].
    pub services: Services,
    /// The concrete connector registry, for reload and catalog listing.
    pub registry: Arc<ConnectorRegistry>,
    /// The concrete SQLite audit sink, for reading recent audit lines back.
    pub audit: Arc<SqliteAuditSink>,
    /// The concrete snapshot metrics sink, for a metrics read endpoint.
    pub metrics: Arc<SnapshotMetricsSink>,
}

/// Constructs every collaborator named in `config` and bundles them.
///
/// # Errors
/// Returns [`ServerError::RegistryUnreadable`] if the connector directory
/// cannot be read, [`ServerError::RegistryEmpty`] if it loads zero valid
/// connectors, and [`ServerError::StoreUnreachable`] if the SQLite run-log
/// store cannot be opened.
pub fn build_services(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<BuiltServices, ServerError> {
    let registry = Arc::new(
        ConnectorRegistry::load(Path::new(&config.storage.connector_dir))
            .map_err(|err| ServerError::RegistryUnreadable(err.to_string()))?,
    );
    if registry.list_connectors().is_empty() {
        return Err(ServerError::RegistryEmpty);
    }

    let http_config = HttpActionConfig::default();
    let http = HttpActionInvoker::new(http_config)
        .map_err(|err: ConnectorError| ServerError::RegistryUnreadable(err.to_string()))?;
    let connectors: Arc<dyn automatix_core::ConnectorInvoker> =
        Arc::new(CompositeConnectorInvoker::new(http, Arc::new(StubConnectorInvoker::new())));

    let budget = Arc::new(InMemoryBudgetGate::new(clock.clone(), config.llm.budget_daily_usd));
    let llm = Arc::new(
        LlmCallShell::new(Arc::new(StubLlmProvider::new()), Vec::new(), budget, clock.clone())
            .with_default_cache_ttl_sec(config.llm.cache_default_ttl_sec),
    );

    let run_log: Arc<dyn automatix_core::RunLogStore> = Arc::new(if config.storage.sqlite_path == ":memory:" {
        SqliteRunLogStore::open_in_memory().map_err(|err| ServerError::StoreUnreachable(err.to_string()))?
    } else {
        SqliteRunLogStore::open(Path::new(&config.storage.sqlite_path))
            .map_err(|err| ServerError::StoreUnreachable(err.to_string()))?
    });

    let audit = if config.storage.sqlite_path == ":memory:" {
        Arc::new(
            SqliteAuditSink::open_in_memory(clock.clone())
                .map_err(|err| ServerError::StoreUnreachable(err.to_string()))?,
        )
    } else {
        Arc::new(
            SqliteAuditSink::open(Path::new(&config.storage.sqlite_path), clock.clone())
                .map_err(|err| ServerError::StoreUnreachable(err.to_string()))?,
        )
    };
    let metrics = Arc::new(SnapshotMetricsSink::new());

    let services = Services::new(
        connectors,
        llm,
        run_log,
        audit.clone() as Arc<dyn automatix_core::AuditSink>,
        metrics.clone() as Arc<dyn automatix_core::MetricsSink>,
        registry.clone() as Arc<dyn ConnectorCatalog>,
    );

    Ok(BuiltServices { services, registry, audit, metrics })
}

#[cfg(test)]
mod tests {
    use automatix_core::SystemClock;

    use super::*;

    fn connector_dir_with_one_connector() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("sheets.toml"),
            r#"
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
"#,
        )
        .expect("write connector");
        dir
    }

    #[test]
    fn builds_services_from_valid_config() {
        let dir = connector_dir_with_one_connector();
        let mut config = AppConfig::default();
        config.storage.connector_dir = dir.path().to_string_lossy().into_owned();
        config.storage.sqlite_path = ":memory:".to_string();

        let built = build_services(&config, Arc::new(SystemClock)).expect("build services");
        assert!(built.registry.is_valid_node_type("action.sheets:append_row"));
    }

    #[test]
    fn empty_connector_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.storage.connector_dir = dir.path().to_string_lossy().into_owned();
        config.storage.sqlite_path = ":memory:".to_string();

        let result = build_services(&config, Arc::new(SystemClock));
        assert!(matches!(result, Err(ServerError::RegistryEmpty)));
    }

    #[test]
    fn unreadable_connector_directory_is_rejected() {
        let mut config = AppConfig::default();
        config.storage.connector_dir = "/nonexistent/automatix-connectors".to_string();
        config.storage.sqlite_path = ":memory:".to_string();

        let result = build_services(&config, Arc::new(SystemClock));
        assert!(matches!(result, Err(ServerError::RegistryUnreadable(_))));
    }
}
