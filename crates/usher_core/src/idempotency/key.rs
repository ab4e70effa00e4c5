//! Execution-key derivation for reservation deduplication.
//!
//! One logical reservation attempt is identified by the pair
//! (requester identity, resource identity). Retries of the same logical
//! request MUST derive the same key; distinct logical requests MUST
//! derive distinct keys.
//!
//! **Hard rule:** wall-clock timestamps never participate in the key or
//! the digest: a retry minutes later must collapse onto the same entry.

use std::fmt;

use xxhash_rust::xxh64::xxh64;

/// Deterministic identifier for one logical reservation attempt.
///
/// Canonical form is `"{requester_id}:{resource_id}"`. Identities that
/// contain the `':'` separator must be rejected before derivation (the
/// purchase front door does); the digest below is built from separated
/// fields and is ambiguity-free either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionKey(String);

impl ExecutionKey {
    /// Derive the key for (requester, resource).
    pub fn derive(requester_id: &str, resource_id: &str) -> Self {
        Self(format!("{requester_id}:{resource_id}"))
    }

    /// Reconstruct a key from its stored canonical form.
    pub fn from_canonical(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the xxh64 digest of (requester, resource).
///
/// Uses a separator byte (0xFF) that cannot appear in UTF-8 strings to
/// prevent field-boundary ambiguity. Used for compact log labels, never
/// as the ledger identity.
pub fn key_digest(requester_id: &str, resource_id: &str) -> u64 {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(requester_id.as_bytes());
    buf.push(0xFF);
    buf.extend_from_slice(resource_id.as_bytes());
    xxh64(&buf, 0)
}

/// Format a key digest as a 16-char lowercase hex string.
pub fn format_key_digest(digest: u64) -> String {
    format!("{digest:016x}")
}
