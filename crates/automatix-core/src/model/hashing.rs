// automatix-core/src/model/hashing.rs
// ============================================================================
// Module: Automatix Canonical Hashing
// Description: RFC 8785 JSON canonicalization and content hashing utilities.
// Purpose: Provide deterministic hashes for dedupe hashes, fingerprints, and
//          idempotency keys.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Dedupe hashes (`TriggerEvent.dedupeHash`), LLM fingerprints, and
//! idempotency keys are all content-addressed. Automatix canonicalizes
//! values with RFC 8785 (JCS) before hashing so the result is stable across
//! serializers and field orderings.

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Supported hash algorithms for Automatix content addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

/// Default hash algorithm used across dedupe hashes and fingerprints.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// A deterministic content hash, as a lowercase hex string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Algorithm used to produce this digest.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Builds a digest value from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self { algorithm, value: hex_encode(bytes) }
    }
}

impl std::fmt::Display for HashDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Errors raised while computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// Canonical JSON serialization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

/// Returns canonical JSON bytes for a serializable value per RFC 8785.
///
/// # Errors
/// Returns [`HashError::Canonicalization`] if the value cannot be serialized.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes a serializable value after canonicalizing it.
///
/// # Errors
/// Returns [`HashError::Canonicalization`] if the value cannot be serialized.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes directly, with no canonicalization step.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            HashDigest::new(HashAlgorithm::Sha256, &hasher.finalize())
        }
    }
}

/// Hashes a sequence of byte slices as a single concatenated digest.
///
/// Used for composite keys like dedupe hashes (`H(webhookId, timestamp,
/// body)`) and LLM fingerprints, where each component is length-prefixed so
/// that `H("a", "bc")` cannot collide with `H("ab", "c")`.
#[must_use]
pub fn hash_parts(algorithm: HashAlgorithm, parts: &[&[u8]]) -> HashDigest {
    let mut buf = Vec::new();
    for part in parts {
        buf.extend_from_slice(&(part.len() as u64).to_be_bytes());
        buf.extend_from_slice(part);
    }
    hash_bytes(algorithm, &buf)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn hash_parts_is_not_ambiguous_across_boundaries() {
        let a = hash_parts(DEFAULT_HASH_ALGORITHM, &[b"a", b"bc"]);
        let b = hash_parts(DEFAULT_HASH_ALGORITHM, &[b"ab", b"c"]);
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn hash_bytes_is_deterministic() {
        let a = hash_bytes(DEFAULT_HASH_ALGORITHM, b"payload");
        let b = hash_bytes(DEFAULT_HASH_ALGORITHM, b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_json_ignores_field_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        let ha = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &a).expect("hash a");
        let hb = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &b).expect("hash b");
        assert_eq!(ha, hb);
    }

    proptest! {
        /// A dedupe hash over the same webhook id, timestamp component, and raw
        /// body bytes must come out identical on every delivery, or retried
        /// deliveries of the same event would never dedupe.
        #[test]
        fn hash_parts_is_stable_for_identical_inputs(
            id in ".{0,16}", ts in ".{0,16}", body in ".{0,64}",
        ) {
            let parts: [&[u8]; 3] = [id.as_bytes(), ts.as_bytes(), body.as_bytes()];
            let first = hash_parts(DEFAULT_HASH_ALGORITHM, &parts);
            let second = hash_parts(DEFAULT_HASH_ALGORITHM, &parts);
            prop_assert_eq!(first, second);
        }

        /// A one-byte change anywhere in the body must not be silently
        /// absorbed into an identical dedupe hash, or a genuinely distinct
        /// delivery would be dropped as a duplicate.
        #[test]
        fn hash_parts_changes_when_body_changes(
            id in ".{0,16}", ts in ".{0,16}", body in "[a-z]{1,32}", extra_char in "[A-Z]",
        ) {
            let mut changed_body = body.clone();
            changed_body.push_str(&extra_char);
            let original = hash_parts(DEFAULT_HASH_ALGORITHM, &[id.as_bytes(), ts.as_bytes(), body.as_bytes()]);
            let changed = hash_parts(DEFAULT_HASH_ALGORITHM, &[id.as_bytes(), ts.as_bytes(), changed_body.as_bytes()]);
            prop_assert_ne!(original, changed);
        }
    }
}
