// automatix-core/src/model/identifiers.rs
// ============================================================================
// Module: Automatix Identifiers
// Description: Newtype wrappers for every entity identifier in the system.
// Purpose: Prevent accidental mixing of identifier kinds at compile time.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every entity identifier in Automatix is a distinct newtype over `String`
//! rather than a bare string, so a `NodeId` cannot be passed where a
//! `WorkflowId` is expected. All of them serialize transparently.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! string_identifier {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the owned string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_identifier!(WorkflowId, "Identifies a workflow graph definition, independent of version.");
string_identifier!(NodeId, "Identifies a node uniquely within its owning graph.");
string_identifier!(ExecutionId, "Identifies a single run of a workflow graph.");
string_identifier!(UserId, "Identifies the tenant user on whose behalf an execution runs.");
string_identifier!(WebhookId, "Identifies a registered webhook trigger endpoint.");
string_identifier!(PollId, "Identifies a registered polling trigger.");
string_identifier!(CorrelationId, "Identifies one execution's thread of causation across logs, outbound headers, and persisted records.");
string_identifier!(DedupeHash, "Content-addressed identifier used to suppress duplicate trigger deliveries.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_roundtrip_through_display_and_construction() {
        let id = WorkflowId::new("wf-123");
        assert_eq!(id.as_str(), "wf-123");
        assert_eq!(id.to_string(), "wf-123");
        assert_eq!(WorkflowId::from("wf-123"), id);
    }

    #[test]
    fn identifiers_serialize_transparently() {
        let id = NodeId::new("node-a");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"node-a\"");
        let back: NodeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
