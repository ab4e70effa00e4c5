//! Outbound store contracts: the conditional-write seams the engine
//! consumes.
//!
//! Both stores expose single atomic conditional operations. The engine
//! never reads a value and writes it back separately; every guard is
//! re-checked by the store at write time, atomically with the mutation.

use std::fmt;

use crate::idempotency::ExecutionKey;

use super::attempt::{AttemptRecord, AttemptState};

// --- Store error --------------------------------------------------------

/// Error surfaced by a store implementation.
///
/// Business-level conditions (duplicate key, exhausted pool, missing
/// resource) are typed outcomes, not errors. A `StoreError` means the
/// operation's true outcome is unknown or the store refused the write;
/// the coordinator reports it as an internal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The bounded call did not finish in time; the outcome is unknown.
    TimedOut {
        /// Name of the store operation that expired.
        op: &'static str,
    },
    /// The bounded store refused to accept a new record.
    CapacityFull,
    /// Generic read/write failure.
    WriteFailed { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut { op } => write!(f, "store call timed out: {op}"),
            Self::CapacityFull => write!(f, "store capacity full"),
            Self::WriteFailed { reason } => write!(f, "store write failed: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

// --- Ledger store -------------------------------------------------------

/// Outcome of a create-if-absent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// No record existed; the new record was created.
    Created,
    /// A record already exists. Snapshot returned, nothing mutated.
    AlreadyExists(AttemptRecord),
}

/// Outcome of a conditional state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record matched the expected state and was updated.
    Applied,
    /// The record exists but is not in the expected state. No write.
    PreconditionFailed {
        /// State observed at update time.
        actual: AttemptState,
    },
    /// No record exists for the key.
    NotFound,
}

/// Durable attempt-record store with create-if-absent semantics.
///
/// Creation is the mutual-exclusion primitive: of any number of
/// concurrent callers for the same key, exactly one observes `Created`.
pub trait LedgerStore: Send + Sync {
    /// Atomically create `record` unless a record for its key exists.
    fn create_if_absent(&self, record: AttemptRecord) -> Result<CreateOutcome, StoreError>;

    /// Atomically move the record for `key` from `expected` to `next`.
    fn conditional_update(
        &self,
        key: &ExecutionKey,
        expected: AttemptState,
        next: AttemptState,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Snapshot the record for `key`, if any.
    fn get(&self, key: &ExecutionKey) -> Result<Option<AttemptRecord>, StoreError>;
}

// --- Counter store ------------------------------------------------------

/// Outcome of a guarded decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// The guard held; `remaining` is the post-decrement value.
    Decremented {
        /// Units left after the decrement.
        remaining: u64,
    },
    /// Fewer units remain than requested. No write occurred.
    Exhausted {
        /// Units left, unchanged.
        remaining: u64,
    },
    /// The resource is not provisioned.
    NotFound,
}

/// Durable per-resource unit counter with guarded decrement.
///
/// The counter is only ever decremented by the engine; provisioning
/// happens out-of-band and there is no refund operation.
pub trait CounterStore: Send + Sync {
    /// Atomically subtract `amount` if the resource exists and at least
    /// `amount` units remain. The guard and the write are one operation.
    fn conditional_decrement(
        &self,
        resource_id: &str,
        amount: u64,
    ) -> Result<DecrementOutcome, StoreError>;

    /// Remaining units for `resource_id`, `None` if not provisioned.
    /// Read-only probe; never used to guard a write.
    fn units_remaining(&self, resource_id: &str) -> Result<Option<u64>, StoreError>;
}
