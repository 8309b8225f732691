// automatix-server/src/lib.rs
// ============================================================================
// Module: Automatix Server
// Description: Public API surface wiring Trigger Ingress, the Workflow
//              Runtime, and Run Observability into one HTTP process.
// Purpose: Give an operator one binary-sized process that boots the
//          platform's core components against a TOML configuration file.
// Dependencies: automatix_core, automatix_connectors, automatix_ingress,
//               automatix_llm, automatix_registry, automatix_signature,
//               automatix_store_sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! `automatix-server` does not implement any workflow semantics itself; it
//! wires together the crates that do. [`config::AppConfig`] loads and
//! validates process configuration; [`services::build_services`] constructs
//! an [`automatix_core::Services`] bundle (the connector invoker, the LLM
//! Call Shell, the SQLite run-log store, audit/metrics sinks, and the
//! connector registry); [`state::ServerState`] bundles that alongside a
//! [`automatix_core::WorkflowRuntime`], a [`graphs::WorkflowGraphStore`],
//! an [`automatix_ingress::WebhookIngress`], and an
//! [`automatix_ingress::PollScheduler`]; and [`handlers`] implements the
//! HTTP surface of §6 on top of it. [`serve::run`] is the process entry
//! point the `automatix-cli` `serve` subcommand and this crate's own
//! integration tests both call into.

#![doc(html_no_source)]

pub mod audit;
pub mod config;
pub mod error;
pub mod graphs;
pub mod handlers;
pub mod metrics;
pub mod poll_loop;
pub mod serve;
pub mod services;
pub mod state;

pub use audit::SqliteAuditSink;
pub use audit::StderrAuditSink;
pub use config::AppConfig;
pub use config::ConfigError;
pub use error::ServerError;
pub use graphs::GraphStoreError;
pub use graphs::WorkflowGraphStore;
pub use metrics::SnapshotMetricsSink;
pub use serve::run;
pub use services::build_services;
pub use services::BuiltServices;
pub use state::ServerState;
