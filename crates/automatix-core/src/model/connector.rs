// automatix-core/src/model/connector.rs
// ============================================================================
// Module: Automatix Connector Definition
// Description: The typed catalog shape the Connector Registry loads,
//              validates, and exposes to the Planner Adapter and Runtime.
// Purpose: Describe an external service's actions, triggers, and auth scopes.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ConnectorDefinition`] is the unit of catalog data the registry loads
//! from disk. It intentionally carries no client/transport logic — just
//! enough shape for the Planner Adapter to validate a plan step and for the
//! Workflow Runtime to know an operation's parameter types, output schema,
//! and default retry/timeout behavior.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::model::retry::RetryPolicy;

/// A coarse grouping used by `getNodeCatalog` for UI consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorCategory {
    /// Email and messaging connectors (Gmail, Slack, Intercom, …).
    Communication,
    /// Spreadsheets, documents, and file storage connectors.
    Productivity,
    /// Payment and billing connectors (Stripe, Square, …).
    Payments,
    /// Developer tooling connectors (GitHub, GitLab, …).
    Developer,
    /// Scheduling and calendaring connectors.
    Scheduling,
    /// Core, built-in operations: transforms, branches, HTTP, schedule.
    Core,
    /// Any connector that does not fit the above groupings.
    Other,
}

/// The authentication scheme a connector requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthScheme {
    /// No authentication required.
    None,
    /// API-key header or query parameter authentication.
    ApiKey {
        /// The header or query parameter name carrying the key.
        param_name: String,
    },
    /// OAuth2 with a fixed set of allowed scopes.
    OAuth2 {
        /// Scopes this connector's operations may request.
        allowed_scopes: Vec<String>,
    },
    /// HMAC-signed webhook secret, carried out of band (no inbound auth
    /// header on actions; used for connectors that are trigger-only).
    WebhookSecret,
}

/// A parameter or output field type, used for lightweight validation at
/// plan time; this is deliberately not a full schema language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// A UTF-8 string.
    String,
    /// A 64-bit floating point number.
    Number,
    /// A boolean.
    Boolean,
    /// A JSON object of unspecified shape.
    Object,
    /// A JSON array of unspecified element type.
    Array,
    /// Any JSON value.
    Any,
}

/// A named parameter's type and requiredness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamTypeSpec {
    /// The parameter's type.
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the parameter must be supplied.
    pub required: bool,
    /// A human-readable description, shown in the planner catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An action definition: a connector operation invoked as `action.{app}:{op}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// The operation id, unique within its connector.
    pub id: String,
    /// A human-readable name.
    pub name: String,
    /// Required and optional input parameters, by name.
    pub input_params: BTreeMap<String, ParamTypeSpec>,
    /// The JSON Schema describing this action's output shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Optional rate-limit hint (requests per minute).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,
    /// OAuth2 scopes this action requires, if the connector uses OAuth2.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    /// Default retry policy for this action, overridable per node.
    #[serde(default)]
    pub default_retry_policy: RetryPolicy,
    /// Per-node timeout override in milliseconds; falls back to the
    /// runtime's `defaultNodeTimeoutMs` configuration when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A trigger definition: an operation invoked as `trigger.{app}:{op}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDefinition {
    /// The operation id, unique within its connector.
    pub id: String,
    /// A human-readable name.
    pub name: String,
    /// Whether this trigger supports webhook delivery (vs. poll-only).
    pub supports_webhook: bool,
    /// The key within a poll item used to compute the poll dedupe hash,
    /// when this trigger is driven by polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_dedupe_key: Option<String>,
    /// The JSON Schema describing this trigger's payload shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_schema: Option<Value>,
    /// OAuth2 scopes this trigger requires, if the connector uses OAuth2.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
}

/// A loaded, validated connector description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorDefinition {
    /// The connector's canonical, normalized app id.
    pub id: String,
    /// A human-readable display name.
    pub name: String,
    /// The catalog grouping used by `getNodeCatalog`.
    pub category: ConnectorCategory,
    /// The authentication scheme this connector requires.
    pub authentication: AuthScheme,
    /// This connector's actions, keyed by operation id for lookup.
    pub actions: Vec<ActionDefinition>,
    /// This connector's triggers, keyed by operation id for lookup.
    pub triggers: Vec<TriggerDefinition>,
}

impl ConnectorDefinition {
    /// Finds an action by its operation id.
    #[must_use]
    pub fn action(&self, op_id: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|a| a.id == op_id)
    }

    /// Finds a trigger by its operation id.
    #[must_use]
    pub fn trigger(&self, op_id: &str) -> Option<&TriggerDefinition> {
        self.triggers.iter().find(|t| t.id == op_id)
    }
}
