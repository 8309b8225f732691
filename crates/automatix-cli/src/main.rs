// automatix-cli/src/main.rs
// ============================================================================
// Module: Operator CLI Entry Point
// Description: Command dispatcher for booting the server process and
//              operating the Connector Registry and DLQ without one.
// Purpose: Give an operator one binary for every day-to-day task, sharing
//          automatix-server's wiring rather than reimplementing it.
// Dependencies: automatix-core, automatix-registry, automatix-server,
//               automatix-store-sqlite, clap, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`Cli`] has three subcommand groups: `serve` boots the HTTP process via
//! [`automatix_server::run`]; `registry` inspects and dry-run-reloads a
//! connector directory via [`automatix_registry::ConnectorRegistry`]
//! directly, for use before a directory is deployed; `dlq` lists and
//! replays parked node failures against a real [`automatix_core::Services`]
//! bundle built with [`automatix_server::build_services`], the same
//! function the server process itself uses. No subcommand here duplicates
//! runtime logic that already lives in `automatix-core` or
//! `automatix-server`.

use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use automatix_core::Clock;
use automatix_core::ConnectorContext;
use automatix_core::CorrelationId;
use automatix_core::ExecutionId;
use automatix_core::NodeId;
use automatix_core::NodeStatus;
use automatix_core::SystemClock;
use automatix_registry::ConnectorRegistry;
use automatix_server::AppConfig;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "automatix", about = "Automatix workflow automation platform operator CLI")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot the HTTP server process.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(long, value_name = "PATH", default_value = "automatix.toml")]
        config: PathBuf,
    },
    /// Connector Registry inspection utilities.
    Registry {
        /// Selected registry subcommand.
        #[command(subcommand)]
        command: RegistryCommand,
    },
    /// Dead Letter Queue inspection and replay utilities.
    Dlq {
        /// Selected DLQ subcommand.
        #[command(subcommand)]
        command: DlqCommand,
    },
}

/// Registry subcommands. Each loads definitions directly off disk rather
/// than through a running server, so they work against a directory before
/// it is deployed.
#[derive(Subcommand, Debug)]
enum RegistryCommand {
    /// List every connector the directory resolves to, one line each.
    List {
        /// Directory containing connector definition files.
        #[arg(long, value_name = "DIR")]
        connector_dir: PathBuf,
    },
    /// Load the directory and report any malformed-file diagnostics
    /// without starting a server.
    Validate {
        /// Directory containing connector definition files.
        #[arg(long, value_name = "DIR")]
        connector_dir: PathBuf,
    },
    /// Load, then immediately reload, the directory — a smoke test for the
    /// same reload path `POST /admin/registry/reload` exercises on a live
    /// server.
    Reload {
        /// Directory containing connector definition files.
        #[arg(long, value_name = "DIR")]
        connector_dir: PathBuf,
    },
}

/// DLQ subcommands, operating against the same [`automatix_core::Services`]
/// bundle the server process runs with.
#[derive(Subcommand, Debug)]
enum DlqCommand {
    /// List parked node failures.
    List {
        /// Path to the TOML configuration file.
        #[arg(long, value_name = "PATH", default_value = "automatix.toml")]
        config: PathBuf,
        /// Restrict the listing to one workflow id.
        #[arg(long, value_name = "WORKFLOW_ID")]
        workflow_id: Option<String>,
    },
    /// Replay one parked node failure by directly re-invoking its
    /// connector operation with its stored payload.
    Replay {
        /// Path to the TOML configuration file.
        #[arg(long, value_name = "PATH", default_value = "automatix.toml")]
        config: PathBuf,
        /// The execution id the failed node belongs to.
        execution_id: String,
        /// The node id to replay.
        node_id: String,
    },
}

/// Errors the CLI's own command handlers can raise, independent of
/// whatever a subcommand delegates to `automatix-server` for.
#[derive(Debug, Error)]
enum CliError {
    /// Wraps a server-side error, carrying its exit code contract through.
    #[error(transparent)]
    Server(#[from] automatix_server::ServerError),
    /// The connector directory could not be listed at all.
    #[error("connector directory unreadable: {0}")]
    RegistryUnreadable(#[from] automatix_registry::RegistryError),
    /// No DLQ item matched the given execution and node ids.
    #[error("no dlq item for execution {execution_id} node {node_id}")]
    DlqItemNotFound {
        /// The execution id that was searched for.
        execution_id: String,
        /// The node id that was searched for.
        node_id: String,
    },
    /// The matched DLQ item's node type does not resolve to a known
    /// connector operation.
    #[error("unresolvable node type for execution {execution_id} node {node_id}")]
    UnresolvableNodeType {
        /// The execution id the item belongs to.
        execution_id: String,
        /// The node id the item belongs to.
        node_id: String,
    },
    /// The run log store rejected a read or write.
    #[error("run log error: {0}")]
    RunLog(String),
    /// The replayed connector invocation itself failed.
    #[error("connector invocation failed: {0}")]
    Invocation(String),
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let mut stderr = std::io::stderr();
            let _ignored = std::io::Write::write_fmt(&mut stderr, format_args!("error: {err}\n"));
            exit_code_for(&err)
        }
    }
}

/// Maps a [`CliError`] to the platform's exit code contract where one
/// applies, and to `1` for every CLI-local failure otherwise.
fn exit_code_for(err: &CliError) -> ExitCode {
    match err {
        CliError::Server(server_err) => ExitCode::from(server_err.exit_code()),
        _ => ExitCode::FAILURE,
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve { config } => command_serve(&config).await,
        Commands::Registry { command } => command_registry(command),
        Commands::Dlq { command } => command_dlq(command).await,
    }
}

async fn command_serve(config_path: &Path) -> Result<(), CliError> {
    let config = AppConfig::from_file(config_path).map_err(automatix_server::ServerError::from)?;
    automatix_server::run(config).await?;
    Ok(())
}

fn command_registry(command: RegistryCommand) -> Result<(), CliError> {
    match command {
        RegistryCommand::List { connector_dir } => {
            let registry = ConnectorRegistry::load(&connector_dir)?;
            for connector in registry.list_connectors() {
                println_line(&format!(
                    "{}\t{}\t{} actions\t{} triggers",
                    connector.id,
                    connector.name,
                    connector.actions.len(),
                    connector.triggers.len()
                ));
            }
            Ok(())
        }
        RegistryCommand::Validate { connector_dir } => {
            let registry = ConnectorRegistry::load(&connector_dir)?;
            let diagnostics = registry.diagnostics();
            if diagnostics.is_empty() {
                println_line(&format!("{} connector(s) loaded cleanly", registry.list_connectors().len()));
            } else {
                for diagnostic in &diagnostics {
                    println_line(&format!("{}: {}", diagnostic.path.display(), diagnostic.reason));
                }
            }
            Ok(())
        }
        RegistryCommand::Reload { connector_dir } => {
            let registry = ConnectorRegistry::load(&connector_dir)?;
            let before = registry.list_connectors().len();
            registry.reload()?;
            let after = registry.list_connectors().len();
            println_line(&format!("reloaded: {before} connector(s) before, {after} after"));
            Ok(())
        }
    }
}

async fn command_dlq(command: DlqCommand) -> Result<(), CliError> {
    match command {
        DlqCommand::List { config, workflow_id } => {
            let built = build_services(&config)?;
            let filter = workflow_id.map(automatix_core::WorkflowId::new);
            let items = built
                .services
                .run_log
                .list_dlq(filter.as_ref())
                .await
                .map_err(|err| CliError::RunLog(err.to_string()))?;
            for item in &items {
                println_line(&format!(
                    "{}\t{}\tattempts={}\t{}",
                    item.execution_id, item.node_id, item.attempts, item.last_error
                ));
            }
            Ok(())
        }
        DlqCommand::Replay { config, execution_id, node_id } => {
            let built = build_services(&config)?;
            replay_dlq_item(&built, &execution_id, &node_id).await
        }
    }
}

/// Builds the platform's shared [`automatix_server::Services`] bundle from
/// a configuration file, the same wiring `automatix-server` itself boots
/// with, so the CLI never reimplements connector or run-log construction.
fn build_services(config_path: &Path) -> Result<automatix_server::BuiltServices, CliError> {
    let config = AppConfig::from_file(config_path).map_err(automatix_server::ServerError::from)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    automatix_server::build_services(&config, clock).map_err(CliError::from)
}

/// Replays one parked node failure: finds the matching DLQ item and node
/// execution record, resolves the connector operation its node type names,
/// and re-invokes it with the item's stored payload, mirroring the
/// `POST /executions/{id}/nodes/{nodeId}/retry` handler's logic exactly.
async fn replay_dlq_item(built: &automatix_server::BuiltServices, execution_id: &str, node_id: &str) -> Result<(), CliError> {
    let execution_id = ExecutionId::new(execution_id);
    let node_id = NodeId::new(node_id);

    let dlq_items =
        built.services.run_log.list_dlq(None).await.map_err(|err| CliError::RunLog(err.to_string()))?;
    let item = dlq_items
        .into_iter()
        .find(|item| item.execution_id == execution_id && item.node_id == node_id)
        .ok_or_else(|| CliError::DlqItemNotFound {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
        })?;

    let node_executions = built
        .services
        .run_log
        .list_node_executions(&execution_id)
        .await
        .map_err(|err| CliError::RunLog(err.to_string()))?;
    let node_execution = node_executions.into_iter().find(|ne| ne.node_id == node_id).ok_or_else(|| {
        CliError::DlqItemNotFound { execution_id: execution_id.to_string(), node_id: node_id.to_string() }
    })?;

    let Some((_, app_id, operation_id)) = automatix_registry::split_node_type(&node_execution.node_type) else {
        return Err(CliError::UnresolvableNodeType {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
        });
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let context = ConnectorContext {
        correlation_id: CorrelationId::new(execution_id.as_str()),
        execution_id: execution_id.clone(),
        node_id: node_id.clone(),
        workflow_id: String::new(),
        user_id: String::new(),
        deadline_unix_millis: clock.now_unix_millis() + 60_000,
    };

    let outcome = built
        .services
        .connectors
        .invoke(app_id, operation_id, &item.payload, &[], &context)
        .await
        .map_err(|err| CliError::Invocation(err.to_string()))?;

    let mut replayed = node_execution;
    replayed.status = NodeStatus::Succeeded;
    replayed.output = Some(outcome.output);
    replayed.end_time_unix_millis = Some(clock.now_unix_millis());
    built
        .services
        .run_log
        .put_node_execution(&execution_id, &replayed)
        .await
        .map_err(|err| CliError::RunLog(err.to_string()))?;
    built
        .services
        .run_log
        .delete_dlq_item(&execution_id, &node_id)
        .await
        .map_err(|err| CliError::RunLog(err.to_string()))?;

    println_line(&format!("replayed {execution_id} {node_id}: ok"));
    Ok(())
}

/// Writes one line to stdout directly, since the workspace denies
/// `println!` outside test code.
fn println_line(line: &str) {
    let mut stdout = std::io::stdout();
    let _ignored = std::io::Write::write_fmt(&mut stdout, format_args!("{line}\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_connector(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).expect("write connector");
    }

    const CONNECTOR: &str = r#"
id = "sheets"
name = "Google Sheets"
category = "productivity"

[authentication]
scheme = "none"
allowed_scopes = []

[[actions]]
id = "append_row"
name = "Append Row"
input_params = {}
"#;

    #[test]
    fn registry_list_reports_every_connector() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_connector(dir.path(), "sheets.toml", CONNECTOR);
        let result = command_registry(RegistryCommand::List { connector_dir: dir.path().to_path_buf() });
        assert!(result.is_ok());
    }

    #[test]
    fn registry_validate_reports_diagnostics_free_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_connector(dir.path(), "sheets.toml", CONNECTOR);
        let result = command_registry(RegistryCommand::Validate { connector_dir: dir.path().to_path_buf() });
        assert!(result.is_ok());
    }

    #[test]
    fn registry_validate_surfaces_malformed_file_diagnostics() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_connector(dir.path(), "broken.toml", "not = [valid");
        let result = command_registry(RegistryCommand::Validate { connector_dir: dir.path().to_path_buf() });
        assert!(result.is_ok());
    }

    #[test]
    fn registry_list_on_unreadable_directory_fails() {
        let result =
            command_registry(RegistryCommand::List { connector_dir: PathBuf::from("/nonexistent/connectors") });
        assert!(matches!(result, Err(CliError::RegistryUnreadable(_))));
    }

    #[tokio::test]
    async fn dlq_list_on_empty_store_succeeds() {
        let connector_dir = tempfile::tempdir().expect("tempdir");
        write_connector(connector_dir.path(), "sheets.toml", CONNECTOR);
        let graph_dir = tempfile::tempdir().expect("tempdir");
        let config_dir = tempfile::tempdir().expect("tempdir");
        let config_path = config_dir.path().join("automatix.toml");
        std::fs::write(
            &config_path,
            format!(
                r#"
[storage]
sqlite_path = ":memory:"
connector_dir = "{}"
graph_dir = "{}"
"#,
                connector_dir.path().to_string_lossy().replace('\\', "\\\\"),
                graph_dir.path().to_string_lossy().replace('\\', "\\\\"),
            ),
        )
        .expect("write config");

        let result = command_dlq(DlqCommand::List { config: config_path, workflow_id: None }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn dlq_replay_without_matching_item_reports_not_found() {
        let connector_dir = tempfile::tempdir().expect("tempdir");
        write_connector(connector_dir.path(), "sheets.toml", CONNECTOR);
        let graph_dir = tempfile::tempdir().expect("tempdir");
        let config_dir = tempfile::tempdir().expect("tempdir");
        let config_path = config_dir.path().join("automatix.toml");
        std::fs::write(
            &config_path,
            format!(
                r#"
[storage]
sqlite_path = ":memory:"
connector_dir = "{}"
graph_dir = "{}"
"#,
                connector_dir.path().to_string_lossy().replace('\\', "\\\\"),
                graph_dir.path().to_string_lossy().replace('\\', "\\\\"),
            ),
        )
        .expect("write config");

        let result = command_dlq(DlqCommand::Replay {
            config: config_path,
            execution_id: "exec-1".to_string(),
            node_id: "node-1".to_string(),
        })
        .await;
        assert!(matches!(result, Err(CliError::DlqItemNotFound { .. })));
    }
}
