// automatix-signature/src/lib.rs
// ============================================================================
// Module: Webhook Verifier
// Description: Vendor-keyed HMAC signature verification over raw request
//              bytes.
// Purpose: Let Trigger Ingress reject forged webhook deliveries before a
//          TriggerEvent is ever constructed.
// Dependencies: automatix_core, hmac, sha1, sha2, base64, hex, subtle
// ============================================================================

//! ## Overview
//! Every scheme here operates on the raw request body and raw header values
//! — never on a re-serialized JSON payload — because re-serialization is not
//! guaranteed to reproduce the exact bytes a vendor signed (whitespace,
//! key order, escaping). Constructing a [`VerifyRequest`] forces the caller
//! to hold onto `raw_body: &[u8]` rather than a parsed `Value`, so there is
//! no code path that can accidentally verify against re-serialized JSON.
//!
//! Every comparison of a computed digest against an attacker-supplied one
//! goes through [`subtle::ConstantTimeEq`], never `==`, to avoid leaking
//! comparison-length timing information.

#![doc(html_no_source)]

mod schemes;

use std::collections::BTreeMap;

pub use schemes::VendorScheme;

/// Raw material a signature scheme verifies over. All fields are exactly
/// as received off the wire; callers must not normalize, re-encode, or
/// re-serialize `raw_body` before constructing this.
pub struct VerifyRequest<'a> {
    /// The HTTP method of the inbound request (used by `hubspot`).
    pub method: &'a str,
    /// The `Host` header value (used by `hubspot`).
    pub host: &'a str,
    /// The request path (used by `hubspot`).
    pub path: &'a str,
    /// Request headers, with lowercased names, exactly as received.
    pub headers: &'a BTreeMap<String, String>,
    /// The exact request body bytes.
    pub raw_body: &'a [u8],
    /// The shared secret configured for this webhook trigger.
    pub secret: &'a [u8],
    /// Acceptable clock skew, in seconds, for schemes that embed a
    /// timestamp (slack, stripe, zendesk, hubspot).
    pub timestamp_tolerance_sec: u64,
    /// The verifier's current time, injected by the caller so this crate
    /// never reads the system clock directly.
    pub now_unix_sec: u64,
}

/// The result of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Whether the signature was accepted.
    pub verified: bool,
    /// A short, human-readable reason, always present (even on success, for
    /// audit logging).
    pub reason: String,
}

impl VerifyOutcome {
    fn accept(reason: &str) -> Self {
        Self { verified: true, reason: reason.to_string() }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self { verified: false, reason: reason.into() }
    }
}

/// Errors raised by signature verification that are not themselves a
/// rejection outcome — a missing header or an unparseable signature value
/// still produces a rejecting [`VerifyOutcome`], not one of these; this
/// enum exists for the crate's boundary conformance with the platform's
/// per-crate error convention and is reserved for future use by callers
/// that need a `std::error::Error` rather than a boolean outcome.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The configured scheme requires a secret, but none was supplied.
    #[error("webhook trigger has no configured secret")]
    MissingSecret,
}

/// Verifies `request` against `scheme`, returning whether the signature is
/// accepted and why.
///
/// This never panics on malformed input (missing headers, non-hex/non-base64
/// signature values, or an out-of-range timestamp all produce a rejecting
/// [`VerifyOutcome`] rather than an `Err`).
#[must_use]
pub fn verify(scheme: VendorScheme, request: &VerifyRequest<'_>) -> VerifyOutcome {
    schemes::dispatch(scheme, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn constant_time_path_does_not_depend_on_body_whitespace() {
        let secret = b"shhh";
        let body_a = br#"{"a":1}"#;
        let body_b = br#"{ "a" : 1 }"#;

        let sig_a = schemes::hmac_sha256_hex(secret, body_a);
        let outcome_a = verify(
            VendorScheme::Github,
            &VerifyRequest {
                method: "POST",
                host: "example.com",
                path: "/webhooks/1",
                headers: &headers(&[("x-hub-signature-256", &format!("sha256={sig_a}"))]),
                raw_body: body_a,
                secret,
                timestamp_tolerance_sec: 300,
                now_unix_sec: 1000,
            },
        );
        assert!(outcome_a.verified);

        let sig_b = schemes::hmac_sha256_hex(secret, body_b);
        let outcome_b = verify(
            VendorScheme::Github,
            &VerifyRequest {
                method: "POST",
                host: "example.com",
                path: "/webhooks/1",
                headers: &headers(&[("x-hub-signature-256", &format!("sha256={sig_b}"))]),
                raw_body: body_b,
                secret,
                timestamp_tolerance_sec: 300,
                now_unix_sec: 1000,
            },
        );
        assert!(outcome_b.verified);
    }
}
