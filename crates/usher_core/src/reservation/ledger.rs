//! Attempt-ledger operations over a raw conditional-write store.
//!
//! The ledger is a write-once-per-state-transition log, not a mutable
//! cache: the creation step itself is the mutual-exclusion primitive, so
//! concurrent duplicate calls are detectable without locks: first
//! writer wins, everyone else observes the existing record.

use crate::idempotency::ExecutionKey;

use super::attempt::{AttemptRecord, AttemptState};
use super::store::{CreateOutcome, LedgerStore, StoreError, UpdateOutcome};

/// Outcome of attempting to claim an execution key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The claim was created; this caller owns the attempt.
    Started,
    /// Another attempt holds the key in `InProgress`.
    AlreadyInProgress,
    /// A prior attempt finished. Reuse is the coordinator's policy call.
    AlreadyFinished {
        /// Terminal state of the prior attempt.
        state: AttemptState,
    },
}

/// Outcome of reopening a terminal key for a fresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReopenOutcome {
    /// The terminal record moved back to `InProgress`; this caller owns
    /// the new attempt.
    Reopened,
    /// A concurrent caller changed the record first.
    Lost {
        /// State observed at update time, `None` if the record vanished.
        actual: Option<AttemptState>,
    },
}

/// Ledger operations used by the coordinator.
pub struct Ledger<'a> {
    store: &'a dyn LedgerStore,
}

impl<'a> Ledger<'a> {
    /// Wrap a raw ledger store.
    pub fn new(store: &'a dyn LedgerStore) -> Self {
        Self { store }
    }

    /// Claim `key` by creating an `InProgress` record.
    ///
    /// An existing record is classified and returned untouched; this
    /// call never mutates a record it did not create.
    pub fn try_begin(
        &self,
        key: &ExecutionKey,
        requester_id: &str,
        resource_id: &str,
        now_ms: u64,
    ) -> Result<BeginOutcome, StoreError> {
        let record = AttemptRecord {
            key: key.clone(),
            requester_id: requester_id.to_string(),
            resource_id: resource_id.to_string(),
            state: AttemptState::InProgress,
            created_ms: now_ms,
        };
        match self.store.create_if_absent(record)? {
            CreateOutcome::Created => Ok(BeginOutcome::Started),
            CreateOutcome::AlreadyExists(existing) => {
                if existing.state.is_terminal() {
                    Ok(BeginOutcome::AlreadyFinished {
                        state: existing.state,
                    })
                } else {
                    Ok(BeginOutcome::AlreadyInProgress)
                }
            }
        }
    }

    /// Move a terminal record back to `InProgress` for a policy-approved
    /// retry. The conditional update is the race arbiter: of concurrent
    /// retries for the same key, at most one reopens.
    pub fn reopen(
        &self,
        key: &ExecutionKey,
        prior: AttemptState,
    ) -> Result<ReopenOutcome, StoreError> {
        match self
            .store
            .conditional_update(key, prior, AttemptState::InProgress)?
        {
            UpdateOutcome::Applied => Ok(ReopenOutcome::Reopened),
            UpdateOutcome::PreconditionFailed { actual } => Ok(ReopenOutcome::Lost {
                actual: Some(actual),
            }),
            UpdateOutcome::NotFound => Ok(ReopenOutcome::Lost { actual: None }),
        }
    }

    /// Finalize a granted attempt: conditional `InProgress` -> `Completed`.
    ///
    /// A `PreconditionFailed`/`NotFound` signal means the record no
    /// longer matches the expected prior state (e.g. a concurrent
    /// overwrite). The caller logs it; it is not a reservation failure,
    /// the decrement already happened.
    pub fn mark_completed(&self, key: &ExecutionKey) -> Result<UpdateOutcome, StoreError> {
        self.store
            .conditional_update(key, AttemptState::InProgress, AttemptState::Completed)
    }

    /// Compensation: conditional `InProgress` -> `Failed`.
    ///
    /// Best-effort by contract. The caller swallows any failure of this
    /// call so it never masks the primary error being reported.
    pub fn mark_failed(&self, key: &ExecutionKey) -> Result<UpdateOutcome, StoreError> {
        self.store
            .conditional_update(key, AttemptState::InProgress, AttemptState::Failed)
    }
}
