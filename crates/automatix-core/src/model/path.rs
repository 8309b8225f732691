// automatix-core/src/model/path.rs
// ============================================================================
// Module: Automatix Ref Path Resolution
// Description: Evaluates the dot-path expressions used by ParamValue::Ref.
// Purpose: Fix `ref.path` semantics to dot-path + integer index + `$`, per
//          the resolved open question on JSONPath-ish ambiguity.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A `ref` path is a leading `$` (the referenced node's output root),
//! followed by zero or more `.field` or `[index]` segments. No bracket
//! filters, wildcards, or JSONPath predicates are accepted — this is a
//! deliberately narrow evaluator, not a general query language.

use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing or evaluating a `ref` path expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path did not start with `$`.
    #[error("path must start with '$': {0}")]
    MissingRoot(String),
    /// A segment was neither a valid field name nor an integer index.
    #[error("invalid path segment: {0}")]
    InvalidSegment(String),
    /// The path walked into a field that does not exist on an object, or an
    /// index out of bounds on an array.
    #[error("path segment not found: {0}")]
    NotFound(String),
    /// The path indexed into a value that is not an object or array.
    #[error("cannot index into non-container value at: {0}")]
    NotIndexable(String),
}

/// Resolves a `ref` path expression against a node output value.
///
/// # Errors
/// Returns [`PathError`] if the path is malformed or does not resolve
/// against `root`.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Result<&'a Value, PathError> {
    let rest = path.strip_prefix('$').ok_or_else(|| PathError::MissingRoot(path.to_string()))?;
    let mut current = root;
    for segment in split_segments(rest) {
        current = match segment {
            Segment::Field(name) => {
                let object = current
                    .as_object()
                    .ok_or_else(|| PathError::NotIndexable(path.to_string()))?;
                object.get(name).ok_or_else(|| PathError::NotFound(path.to_string()))?
            }
            Segment::Index(index) => {
                let array =
                    current.as_array().ok_or_else(|| PathError::NotIndexable(path.to_string()))?;
                array.get(index).ok_or_else(|| PathError::NotFound(path.to_string()))?
            }
        };
    }
    Ok(current)
}

enum Segment<'a> {
    Field(&'a str),
    Index(usize),
}

fn split_segments(rest: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut remainder = rest;
    while !remainder.is_empty() {
        if let Some(after_bracket) = remainder.strip_prefix('[') {
            let Some(close) = after_bracket.find(']') else {
                break;
            };
            let (index_str, tail) = after_bracket.split_at(close);
            if let Ok(index) = index_str.parse::<usize>() {
                segments.push(Segment::Index(index));
            }
            remainder = &tail[1..];
        } else if let Some(after_dot) = remainder.strip_prefix('.') {
            let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
            let (field, tail) = after_dot.split_at(end);
            if !field.is_empty() {
                segments.push(Segment::Field(field));
            }
            remainder = tail;
        } else {
            break;
        }
    }
    segments
}
