// automatix-registry/src/normalize.rs
// ============================================================================
// Module: Connector Id Normalization
// Description: appId lowercasing/hyphenation and synonym collapsing.
// Purpose: Give the Planner Adapter and Workflow Runtime one normalization
//          authority so `google-sheets`, `gsheets`, and `sheet` all resolve
//          to the same catalog entry.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Normalization happens once, at lookup time, rather than being baked into
//! stored data: a connector file is keyed by its canonical id (`sheets`),
//! and callers that spell it `google-sheets` or `gsheets` are normalized
//! before the catalog is consulted.

/// Synonym table: `(spelling, canonical)`. Checked after lowercasing and
/// hyphenation, so `Google Sheets`, `google_sheets`, and `gsheets` all
/// collapse to `sheets`.
const SYNONYMS: &[(&str, &str)] = &[
    ("google-sheets", "sheets"),
    ("gsheets", "sheets"),
    ("sheet", "sheets"),
    ("google-drive", "drive"),
    ("gdrive", "drive"),
    ("google-calendar", "calendar"),
    ("gcal", "calendar"),
    ("google-mail", "gmail"),
];

/// The always-valid built-in app id used for transforms, branches, HTTP, and
/// schedule operations, per the platform's registry design.
pub const CORE_APP_ID: &str = "core";

/// Normalizes a raw app id: lowercase, spaces/underscores hyphenated, then
/// any matching synonym collapsed to its canonical spelling.
#[must_use]
pub fn normalize_app_id(raw: &str) -> String {
    let hyphenated: String = raw
        .trim()
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c.to_ascii_lowercase() })
        .collect();
    SYNONYMS
        .iter()
        .find(|(spelling, _)| *spelling == hyphenated)
        .map_or(hyphenated, |(_, canonical)| (*canonical).to_string())
}

/// Splits a node type string into its role prefix (if present) and the
/// `appId:opId` remainder.
///
/// Accepts both the canonical `{role}.{appId}:{opId}` form and the short
/// `{appId}:{opId}` form the registry resolves on the caller's behalf.
#[must_use]
pub fn split_node_type(node_type: &str) -> Option<(Option<&str>, &str, &str)> {
    let (role, rest) = match node_type.split_once('.') {
        Some((role, rest)) => (Some(role), rest),
        None => (None, node_type),
    };
    let (app_id, op_id) = rest.split_once(':')?;
    Some((role, app_id, op_id))
}
