// automatix-connectors/src/lib.rs
// ============================================================================
// Module: Automatix Connectors
// Description: Implementations of `automatix_core::ConnectorInvoker`: a
//              generic HTTP dispatch invoker for the built-in `core:http`
//              action, a scripted stub invoker for tests, and a composite
//              that routes between the two.
// Purpose: Give the Workflow Runtime one connector invocation boundary while
//          keeping real per-vendor API clients out of scope.
// Dependencies: automatix_core, async_trait, reqwest, serde_json
// ============================================================================

//! ## Overview
//! Per the platform's connector invocation boundary, only the uniform
//! `invoke(appId, operationId, params, credentials, context)` contract is
//! specified; individual SaaS connectors' API semantics are not. This crate
//! gives real transport logic to exactly one action — the built-in
//! `core:http` node type, in [`http`] — and leaves every other connector to
//! whatever [`ConnectorInvoker`](automatix_core::ConnectorInvoker) a
//! deployment wires in, with [`stub::StubConnectorInvoker`] standing in for
//! tests and [`composite::CompositeConnectorInvoker`] routing between the
//! two.

#![doc(html_no_source)]

pub mod composite;
pub mod http;
pub mod stub;

pub use composite::CompositeConnectorInvoker;
pub use http::HttpActionConfig;
pub use http::HttpActionInvoker;
pub use stub::StubConnectorInvoker;
