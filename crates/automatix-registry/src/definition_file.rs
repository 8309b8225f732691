// automatix-registry/src/definition_file.rs
// ============================================================================
// Module: Connector Definition File Loading
// Description: Reads a directory of TOML connector description files into
//              validated ConnectorDefinition values.
// Purpose: Give the registry a disk format and skip-with-diagnostic failure
//          semantics, so one malformed file never prevents the process from
//          starting.
// Dependencies: automatix_core, serde, toml, std::fs
// ============================================================================

//! ## Overview
//! Each `*.toml` file in the connector directory describes one connector.
//! A malformed file (bad TOML, duplicate operation ids) is skipped with a
//! [`DefinitionLoadDiagnostic`] rather than aborting the load, matching the
//! platform's "a malformed definition is skipped with a diagnostic; the
//! process does not crash" failure semantics.

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

use automatix_core::ConnectorDefinition;

use crate::normalize::normalize_app_id;

/// One file that failed to load, kept for operator visibility rather than
/// aborting the whole directory load.
#[derive(Debug, Clone)]
pub struct DefinitionLoadDiagnostic {
    /// The file that failed to parse or validate.
    pub path: PathBuf,
    /// A short, human-readable reason.
    pub reason: String,
}

/// The result of loading a connector definition directory: the definitions
/// that parsed and validated cleanly, plus diagnostics for the ones that
/// didn't.
#[derive(Debug, Default)]
pub struct LoadResult {
    /// Successfully loaded and validated connector definitions.
    pub definitions: Vec<ConnectorDefinition>,
    /// Files skipped, with a reason.
    pub diagnostics: Vec<DefinitionLoadDiagnostic>,
}

/// Loads every `*.toml` file directly under `dir` as a connector
/// definition. Files that fail to parse, or whose shape violates the
/// uniqueness invariants in §3 ("identifiers are unique"), are skipped and
/// recorded as a diagnostic rather than failing the whole load.
#[must_use]
pub fn load_directory(dir: &Path) -> LoadResult {
    let mut result = LoadResult::default();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return result;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        match load_file(&path) {
            Ok(definition) => result.definitions.push(definition),
            Err(reason) => result.diagnostics.push(DefinitionLoadDiagnostic { path, reason }),
        }
    }
    result
}

/// Loads and validates a single connector definition file.
///
/// # Errors
/// Returns a human-readable reason string if the file cannot be read,
/// fails to parse as TOML, or its action/trigger ids are not unique.
pub fn load_file(path: &Path) -> Result<ConnectorDefinition, String> {
    let contents = std::fs::read_to_string(path).map_err(|err| err.to_string())?;
    let mut definition: ConnectorDefinition = toml::from_str(&contents).map_err(|err| err.to_string())?;
    definition.id = normalize_app_id(&definition.id);
    validate_unique_ids(&definition)?;
    Ok(definition)
}

/// Checks the `ConnectorDefinition` uniqueness invariant: action ids are
/// unique among themselves, and trigger ids are unique among themselves.
fn validate_unique_ids(definition: &ConnectorDefinition) -> Result<(), String> {
    let mut seen_actions = BTreeSet::new();
    for action in &definition.actions {
        if !seen_actions.insert(action.id.as_str()) {
            return Err(format!("duplicate action id '{}' in connector '{}'", action.id, definition.id));
        }
    }
    let mut seen_triggers = BTreeSet::new();
    for trigger in &definition.triggers {
        if !seen_triggers.insert(trigger.id.as_str()) {
            return Err(format!("duplicate trigger id '{}' in connector '{}'", trigger.id, definition.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_connector(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(contents.as_bytes()).expect("write");
        path
    }

    const VALID_CONNECTOR: &str = r#"
id = "Sheets"
name = "Google Sheets"
category = "productivity"

[authentication]
scheme = "o_auth2"
allowed_scopes = ["sheets.write"]

[[actions]]
id = "append_row"
name = "Append Row"
input_params = {}
"#;

    #[test]
    fn loads_and_normalizes_a_valid_connector() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_connector(dir.path(), "sheets.toml", VALID_CONNECTOR);
        let result = load_directory(dir.path());
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.definitions.len(), 1);
        assert_eq!(result.definitions[0].id, "sheets");
    }

    #[test]
    fn skips_malformed_files_with_a_diagnostic() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_connector(dir.path(), "broken.toml", "not valid toml {{{");
        write_connector(dir.path(), "sheets.toml", VALID_CONNECTOR);
        let result = load_directory(dir.path());
        assert_eq!(result.definitions.len(), 1);
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn rejects_duplicate_action_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_connector(
            dir.path(),
            "dup.toml",
            r#"
id = "dup"
name = "Dup"
category = "other"

[authentication]
scheme = "none"

[[actions]]
id = "do_thing"
name = "Do Thing"
input_params = {}

[[actions]]
id = "do_thing"
name = "Do Thing Again"
input_params = {}
"#,
        );
        let result = load_directory(dir.path());
        assert!(result.definitions.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }
}
