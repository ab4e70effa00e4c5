//! Attempt lifecycle states and records.
//!
//! **States:** `InProgress -> Completed | Failed`
//!
//! A record is created once per execution key, transitioned only through
//! the ledger's conditional updates, and never deleted during normal
//! operation; terminal records are the audit trail. Garbage collection
//! is a separate retention concern outside this engine.

use crate::idempotency::ExecutionKey;

/// Lifecycle state of one reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    /// Claimed; the counter has not yet been adjusted (or the adjustment
    /// was never finalized).
    InProgress,
    /// The counter decrement succeeded and was finalized.
    Completed,
    /// A step after the claim failed; no unit was granted.
    Failed,
}

impl AttemptState {
    /// Whether this state is terminal (no further transitions expected).
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Completed | AttemptState::Failed)
    }
}

/// Persisted attempt record, keyed by execution key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Execution key (primary identity).
    pub key: ExecutionKey,
    /// Requester identity the key was derived from.
    pub requester_id: String,
    /// Resource pool this attempt targets.
    pub resource_id: String,
    /// Current lifecycle state.
    pub state: AttemptState,
    /// Timestamp the attempt was claimed (ms since epoch).
    pub created_ms: u64,
}
