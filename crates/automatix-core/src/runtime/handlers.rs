// automatix-core/src/runtime/handlers.rs
// ============================================================================
// Module: Automatix In-Process Node Handlers
// Description: Pure-function handlers for transform.* and branch.* nodes.
// Purpose: Execute nodes that need no external I/O without going through the
//          connector invocation boundary.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! `transform.core:*` and `branch.core:*` operations run in-process as pure
//! functions over already-resolved parameters, per the execution
//! algorithm's step 5. They never suspend and never fail retryably; a
//! malformed transform input is an [`ErrorKind::Validation`] failure.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::model::error::ErrorKind;

/// Errors raised by an in-process transform or branch handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The operation id is not a recognized built-in transform or branch.
    #[error("unknown in-process operation: {0}")]
    UnknownOperation(String),
    /// The resolved parameters did not match what the operation expects.
    #[error("invalid handler input: {0}")]
    InvalidInput(String),
}

impl HandlerError {
    /// Classifies this error into the shared error taxonomy. In-process
    /// handler failures are always a validation problem, never retryable.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Runs a `transform.core:{op_id}` operation over resolved parameters.
///
/// Recognized operations:
/// - `identity` — returns the `value` parameter unchanged.
/// - `merge` — shallow-merges the `base` and `overlay` object parameters.
/// - `template` — substitutes `${name}` tokens in the `template` string
///   parameter using the `vars` object parameter's string-valued fields.
///
/// # Errors
/// Returns [`HandlerError`] if `op_id` is unrecognized or parameters don't
/// match the operation's expected shape.
pub fn run_transform(op_id: &str, params: &BTreeMap<String, Value>) -> Result<Value, HandlerError> {
    match op_id {
        "identity" => params
            .get("value")
            .cloned()
            .ok_or_else(|| HandlerError::InvalidInput("identity requires 'value'".to_string())),
        "merge" => {
            let base = params
                .get("base")
                .and_then(Value::as_object)
                .ok_or_else(|| HandlerError::InvalidInput("merge requires object 'base'".to_string()))?;
            let overlay = params
                .get("overlay")
                .and_then(Value::as_object)
                .ok_or_else(|| HandlerError::InvalidInput("merge requires object 'overlay'".to_string()))?;
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Ok(Value::Object(merged))
        }
        "template" => {
            let template = params
                .get("template")
                .and_then(Value::as_str)
                .ok_or_else(|| HandlerError::InvalidInput("template requires string 'template'".to_string()))?;
            let vars = params.get("vars").and_then(Value::as_object);
            let mut rendered = template.to_string();
            if let Some(vars) = vars {
                for (key, value) in vars {
                    let token = format!("${{{key}}}");
                    let replacement = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    rendered = rendered.replace(&token, &replacement);
                }
            }
            Ok(Value::String(rendered))
        }
        other => Err(HandlerError::UnknownOperation(other.to_string())),
    }
}

/// Runs a `branch.core:{op_id}` operation, returning the label of the
/// outgoing edge to take.
///
/// Recognized operations:
/// - `select` — returns the `label` string parameter verbatim.
/// - `equals` — returns `"true"` if `left == right`, else `"false"`.
///
/// # Errors
/// Returns [`HandlerError`] if `op_id` is unrecognized or parameters don't
/// match the operation's expected shape.
pub fn run_branch(op_id: &str, params: &BTreeMap<String, Value>) -> Result<String, HandlerError> {
    match op_id {
        "select" => params
            .get("label")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| HandlerError::InvalidInput("select requires string 'label'".to_string())),
        "equals" => {
            let left = params
                .get("left")
                .ok_or_else(|| HandlerError::InvalidInput("equals requires 'left'".to_string()))?;
            let right = params
                .get("right")
                .ok_or_else(|| HandlerError::InvalidInput("equals requires 'right'".to_string()))?;
            Ok((left == right).to_string())
        }
        other => Err(HandlerError::UnknownOperation(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transform_identity_returns_value_unchanged() {
        let mut params = BTreeMap::new();
        params.insert("value".to_string(), json!({"a": 1}));
        assert_eq!(run_transform("identity", &params).expect("identity"), json!({"a": 1}));
    }

    #[test]
    fn transform_merge_overlays_fields() {
        let mut params = BTreeMap::new();
        params.insert("base".to_string(), json!({"a": 1, "b": 2}));
        params.insert("overlay".to_string(), json!({"b": 3}));
        assert_eq!(run_transform("merge", &params).expect("merge"), json!({"a": 1, "b": 3}));
    }

    #[test]
    fn transform_template_substitutes_vars() {
        let mut params = BTreeMap::new();
        params.insert("template".to_string(), json!("hello ${name}"));
        params.insert("vars".to_string(), json!({"name": "world"}));
        assert_eq!(run_transform("template", &params).expect("template"), json!("hello world"));
    }

    #[test]
    fn branch_equals_compares_values() {
        let mut params = BTreeMap::new();
        params.insert("left".to_string(), json!(5));
        params.insert("right".to_string(), json!(5));
        assert_eq!(run_branch("equals", &params).expect("equals"), "true");
    }

    #[test]
    fn unknown_transform_is_an_error() {
        let params = BTreeMap::new();
        assert!(matches!(run_transform("bogus", &params), Err(HandlerError::UnknownOperation(_))));
    }
}
