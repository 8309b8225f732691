// automatix-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: TOML-backed AppConfig covering every recognized option in
//              the platform's configuration surface.
// Purpose: Give the process one fail-closed configuration path, loaded once
//          at startup, with explicit defaults for every field.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! [`AppConfig::from_file`] loads and validates a TOML file; every field
//! recognized by the platform's configuration surface is represented
//! explicitly here rather than read ad hoc from the environment.
//! [`AppConfig::validate`] runs once at startup and a failure there maps to
//! exit code `1`, per the platform's exit code contract.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use automatix_core::BackoffJitter;
use automatix_core::RetryPolicy;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {reason}")]
    Unreadable {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O reason.
        reason: String,
    },
    /// The configuration file did not parse as valid TOML.
    #[error("cannot parse config file {path}: {reason}")]
    Malformed {
        /// The path that failed to parse.
        path: PathBuf,
        /// The parser's error message.
        reason: String,
    },
    /// A parsed field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `runtime.*` configuration options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// `runtime.maxParallelExecutions`.
    pub max_parallel_executions: u32,
    /// `runtime.maxParallelNodesPerExecution`.
    pub max_parallel_nodes_per_execution: u32,
    /// `runtime.defaultNodeTimeoutMs`.
    pub default_node_timeout_ms: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_parallel_executions: 100,
            max_parallel_nodes_per_execution: 4,
            default_node_timeout_ms: 60_000,
        }
    }
}

/// `retry.defaultPolicy` configuration, mirroring `automatix_core::RetryPolicy`
/// field for field so it can be expressed in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied after each attempt.
    pub backoff_multiplier: f64,
    /// Jitter strategy: `"full"`, `"equal"`, or `"none"`.
    pub jitter: String,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff_ms,
            max_backoff_ms: defaults.max_backoff_ms,
            backoff_multiplier: defaults.backoff_multiplier,
            jitter: "equal".to_string(),
        }
    }
}

impl RetrySettings {
    /// Converts to the runtime's [`RetryPolicy`] shape.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if `jitter` names an unknown
    /// strategy.
    pub fn to_retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let jitter = match self.jitter.as_str() {
            "full" => BackoffJitter::Full,
            "equal" => BackoffJitter::Equal,
            "none" => BackoffJitter::None,
            other => {
                return Err(ConfigError::Invalid(format!("unknown jitter strategy: {other}")));
            }
        };
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            backoff_multiplier: self.backoff_multiplier,
            jitter,
            retry_on_http_statuses: Vec::new(),
        })
    }
}

/// `webhook.*` configuration options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// `webhook.signatureTimestampToleranceSec`.
    pub signature_timestamp_tolerance_sec: u64,
    /// `webhook.dedupeWindow`.
    pub dedupe_window: usize,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self { signature_timestamp_tolerance_sec: 300, dedupe_window: 1000 }
    }
}

/// `polling.*` configuration options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// `polling.minIntervalSec`.
    pub min_interval_sec: u64,
    /// How often the poll loop ticks, in seconds. Not a named option in
    /// §6; the platform leaves the tick cadence to the deployment.
    pub tick_interval_sec: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self { min_interval_sec: 30, tick_interval_sec: 15 }
    }
}

/// `llm.*` configuration options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// `llm.cache.defaultTtlSec`.
    pub cache_default_ttl_sec: u64,
    /// `llm.budget.daily`, per user, in USD.
    pub budget_daily_usd: f64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self { cache_default_ttl_sec: 300, budget_daily_usd: 50.0 }
    }
}

/// HTTP listener settings. Not itself one of §6's named options, but every
/// deployment needs a bind address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Address the HTTP server binds to.
    pub listen_addr: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { listen_addr: "127.0.0.1:8080".to_string() }
    }
}

/// Storage settings: where the durable run-log store's SQLite file lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite database file. `":memory:"` opens an in-memory
    /// store, used by tests.
    pub sqlite_path: String,
    /// Directory the connector registry loads definitions from.
    pub connector_dir: String,
    /// Directory workflow graph JSON files are loaded from.
    pub graph_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "automatix.sqlite3".to_string(),
            connector_dir: "connectors".to_string(),
            graph_dir: "graphs".to_string(),
        }
    }
}

/// The full process configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub http: HttpSettings,
    /// Runtime tunables.
    pub runtime: RuntimeSettings,
    /// Default retry policy.
    pub retry: RetrySettings,
    /// Webhook intake settings.
    pub webhook: WebhookSettings,
    /// Polling scheduler settings.
    pub polling: PollingSettings,
    /// LLM Call Shell settings.
    pub llm: LlmSettings,
    /// Storage paths.
    pub storage: StorageSettings,
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns [`ConfigError::Unreadable`] if the file cannot be read, or
    /// [`ConfigError::Malformed`] if it does not parse, or
    /// [`ConfigError::Invalid`] if [`Self::validate`] rejects the result.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let config: Self = toml::from_str(&contents).map_err(|err| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every field with an externally meaningful constraint.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::Invalid(format!("http.listen_addr: {err}")))?;
        if self.runtime.max_parallel_executions == 0 {
            return Err(ConfigError::Invalid("runtime.max_parallel_executions must be > 0".to_string()));
        }
        if self.runtime.max_parallel_nodes_per_execution == 0 {
            return Err(ConfigError::Invalid(
                "runtime.max_parallel_nodes_per_execution must be > 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0".to_string()));
        }
        self.retry.to_retry_policy()?;
        if self.polling.min_interval_sec == 0 {
            return Err(ConfigError::Invalid("polling.min_interval_sec must be > 0".to_string()));
        }
        if self.llm.budget_daily_usd < 0.0 {
            return Err(ConfigError::Invalid("llm.budget_daily_usd must be >= 0".to_string()));
        }
        Ok(())
    }
}
