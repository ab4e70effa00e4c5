//! Reservation results and the rejection-reason registry.

// --- Reject reasons -----------------------------------------------------

/// Stable rejection causes surfaced to callers.
///
/// The `as_str()` names are the documented contract: callers use them to
/// distinguish "retry later", "do not retry", and "already done".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The same logical request is currently being processed.
    /// Recoverable: wait for the in-flight attempt to settle.
    DuplicateInProgress,
    /// The key already finished a prior attempt and terminal-key reuse is
    /// disabled.
    AlreadyProcessed,
    /// The resource is not provisioned. Caller error, not retryable.
    ResourceNotFound,
    /// The pool is depleted. Terminal for this request.
    ResourceExhausted,
    /// Store failure, timeout, or ambiguous outcome. Retryable with the
    /// same key: the retry observes the prior ledger state instead of
    /// re-decrementing.
    InternalError,
}

impl RejectReason {
    /// Stable identifier for logs and caller-facing payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::DuplicateInProgress => "DuplicateInProgress",
            RejectReason::AlreadyProcessed => "AlreadyProcessed",
            RejectReason::ResourceNotFound => "ResourceNotFound",
            RejectReason::ResourceExhausted => "ResourceExhausted",
            RejectReason::InternalError => "InternalError",
        }
    }

    /// Whether the caller may usefully retry this request with the same
    /// execution key.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            RejectReason::DuplicateInProgress | RejectReason::InternalError
        )
    }
}

const REGISTRY: &[RejectReason] = &[
    RejectReason::DuplicateInProgress,
    RejectReason::AlreadyProcessed,
    RejectReason::ResourceNotFound,
    RejectReason::ResourceExhausted,
    RejectReason::InternalError,
];

/// All rejection reasons, for exhaustive iteration in tests.
pub fn reject_reason_registry() -> &'static [RejectReason] {
    REGISTRY
}

// --- Reserve outcome ----------------------------------------------------

/// Result of one `reserve` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// One unit was granted.
    Granted {
        /// Post-decrement pool size.
        remaining: u64,
    },
    /// No unit was granted.
    Rejected {
        /// Why the request was rejected.
        reason: RejectReason,
    },
}

impl ReserveOutcome {
    /// Whether a unit was granted.
    pub fn granted(&self) -> bool {
        matches!(self, ReserveOutcome::Granted { .. })
    }

    /// Post-decrement pool size, if granted.
    pub fn remaining(&self) -> Option<u64> {
        match self {
            ReserveOutcome::Granted { remaining } => Some(*remaining),
            ReserveOutcome::Rejected { .. } => None,
        }
    }

    /// Rejection reason, if rejected.
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ReserveOutcome::Granted { .. } => None,
            ReserveOutcome::Rejected { reason } => Some(*reason),
        }
    }
}
