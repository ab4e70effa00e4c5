//! Reservation coordinator: claim -> probe -> decrement -> finalize.
//!
//! The coordinator holds no shared mutable state of its own; every
//! cross-caller decision is delegated to the stores' atomic conditional
//! operations. The ledger claim runs BEFORE the counter mutation so a
//! crash between the two leaves a diagnosable `InProgress` record rather
//! than an untracked partial decrement.
//!
//! **State machine per execution key:**
//! ```text
//! (start) --try_begin--> InProgress
//! InProgress --decrement ok--> Completed
//! InProgress --Exhausted/NotFound/store error--> Failed
//! existing InProgress --> rejected DuplicateInProgress, no state change
//! existing terminal --> rejected AlreadyProcessed, unless
//!                       allow_retry_after_terminal reopens it
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::idempotency::{ExecutionKey, format_key_digest, key_digest};

use super::attempt::AttemptState;
use super::ledger::{BeginOutcome, Ledger, ReopenOutcome};
use super::outcome::{RejectReason, ReserveOutcome};
use super::store::{CounterStore, DecrementOutcome, LedgerStore, StoreError, UpdateOutcome};

// --- Configuration ------------------------------------------------------

/// Policy knobs for the coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatorConfig {
    /// If true, a key left in a terminal state (`Completed`/`Failed`) by
    /// a prior attempt may be reopened for a brand-new attempt. If false,
    /// such keys are rejected as already processed.
    pub allow_retry_after_terminal: bool,
}

// --- Metrics ------------------------------------------------------------

/// Observability counters for reserve operations.
#[derive(Debug, Default)]
pub struct ReserveMetrics {
    granted_total: AtomicU64,
    duplicate_in_progress_total: AtomicU64,
    already_processed_total: AtomicU64,
    resource_not_found_total: AtomicU64,
    resource_exhausted_total: AtomicU64,
    internal_error_total: AtomicU64,
    finalize_mismatch_total: AtomicU64,
    compensation_failure_total: AtomicU64,
}

impl ReserveMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_granted(&self) {
        self.granted_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reject(&self, reason: RejectReason) {
        self.reject_counter(reason).fetch_add(1, Ordering::Relaxed);
    }

    fn record_finalize_mismatch(&self) {
        self.finalize_mismatch_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_compensation_failure(&self) {
        self.compensation_failure_total
            .fetch_add(1, Ordering::Relaxed);
    }

    fn reject_counter(&self, reason: RejectReason) -> &AtomicU64 {
        match reason {
            RejectReason::DuplicateInProgress => &self.duplicate_in_progress_total,
            RejectReason::AlreadyProcessed => &self.already_processed_total,
            RejectReason::ResourceNotFound => &self.resource_not_found_total,
            RejectReason::ResourceExhausted => &self.resource_exhausted_total,
            RejectReason::InternalError => &self.internal_error_total,
        }
    }

    /// Total granted reservations.
    pub fn granted_total(&self) -> u64 {
        self.granted_total.load(Ordering::Relaxed)
    }

    /// Total rejections for `reason`.
    pub fn reject_total(&self, reason: RejectReason) -> u64 {
        self.reject_counter(reason).load(Ordering::Relaxed)
    }

    /// Finalize updates that found a stale or missing record.
    pub fn finalize_mismatch_total(&self) -> u64 {
        self.finalize_mismatch_total.load(Ordering::Relaxed)
    }

    /// Compensating updates that themselves failed.
    pub fn compensation_failure_total(&self) -> u64 {
        self.compensation_failure_total.load(Ordering::Relaxed)
    }
}

// --- Coordinator --------------------------------------------------------

/// Orchestrates one idempotent reservation against the two stores.
pub struct Coordinator<'a> {
    ledger: Ledger<'a>,
    counter: &'a dyn CounterStore,
    config: CoordinatorConfig,
}

impl<'a> Coordinator<'a> {
    /// Wire a coordinator over the two store seams.
    pub fn new(
        ledger_store: &'a dyn LedgerStore,
        counter: &'a dyn CounterStore,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            ledger: Ledger::new(ledger_store),
            counter,
            config,
        }
    }

    /// Reserve one unit of `resource_id` on behalf of `requester_id`.
    ///
    /// Never panics and never returns a false grant: an ambiguous store
    /// failure is reported as `InternalError`, which the caller may retry
    /// with the same identities: the retry observes the prior ledger
    /// state instead of re-decrementing.
    pub fn reserve(
        &self,
        requester_id: &str,
        resource_id: &str,
        now_ms: u64,
        metrics: &ReserveMetrics,
    ) -> ReserveOutcome {
        let key = ExecutionKey::derive(requester_id, resource_id);
        let label = format_key_digest(key_digest(requester_id, resource_id));

        match self
            .ledger
            .try_begin(&key, requester_id, resource_id, now_ms)
        {
            Ok(BeginOutcome::Started) => {}
            Ok(BeginOutcome::AlreadyInProgress) => {
                // The first writer owns the attempt. No side effects here.
                return self.reject(RejectReason::DuplicateInProgress, metrics);
            }
            Ok(BeginOutcome::AlreadyFinished { state }) => {
                if !self.config.allow_retry_after_terminal {
                    return self.reject(RejectReason::AlreadyProcessed, metrics);
                }
                match self.ledger.reopen(&key, state) {
                    Ok(ReopenOutcome::Reopened) => {}
                    Ok(ReopenOutcome::Lost { actual }) => {
                        let reason = match actual {
                            Some(AttemptState::InProgress) => RejectReason::DuplicateInProgress,
                            Some(_) => RejectReason::AlreadyProcessed,
                            None => RejectReason::InternalError,
                        };
                        return self.reject(reason, metrics);
                    }
                    Err(err) => return self.fail_internal(&key, &label, err, metrics),
                }
            }
            Err(err) => return self.fail_internal(&key, &label, err, metrics),
        }

        // Existence probe. Read-only: the decrement below re-checks under
        // its own guard, so this is an early exit, not a correctness
        // dependency.
        match self.counter.units_remaining(resource_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.compensate(&key, &label, metrics);
                return self.reject(RejectReason::ResourceNotFound, metrics);
            }
            Err(err) => return self.fail_internal(&key, &label, err, metrics),
        }

        match self.counter.conditional_decrement(resource_id, 1) {
            Ok(DecrementOutcome::Decremented { remaining }) => {
                self.finalize(&key, &label, metrics);
                metrics.record_granted();
                ReserveOutcome::Granted { remaining }
            }
            Ok(DecrementOutcome::Exhausted { .. }) => {
                self.compensate(&key, &label, metrics);
                self.reject(RejectReason::ResourceExhausted, metrics)
            }
            Ok(DecrementOutcome::NotFound) => {
                // Provisioning raced away between probe and decrement.
                self.compensate(&key, &label, metrics);
                self.reject(RejectReason::ResourceNotFound, metrics)
            }
            Err(err) => self.fail_internal(&key, &label, err, metrics),
        }
    }

    fn reject(&self, reason: RejectReason, metrics: &ReserveMetrics) -> ReserveOutcome {
        metrics.record_reject(reason);
        ReserveOutcome::Rejected { reason }
    }

    /// Finalize a granted attempt. A stale or missing record is logged
    /// and counted, never converted into a reservation failure; the
    /// decrement already happened.
    fn finalize(&self, key: &ExecutionKey, label: &str, metrics: &ReserveMetrics) {
        match self.ledger.mark_completed(key) {
            Ok(UpdateOutcome::Applied) => {}
            Ok(outcome) => {
                metrics.record_finalize_mismatch();
                tracing::warn!("finalize mismatch key={} outcome={:?}", label, outcome);
            }
            Err(err) => {
                metrics.record_finalize_mismatch();
                tracing::warn!("finalize failed key={} err={}", label, err);
            }
        }
    }

    /// Best-effort compensation. Its own failure is counted and swallowed
    /// so the primary error is always the one reported.
    fn compensate(&self, key: &ExecutionKey, label: &str, metrics: &ReserveMetrics) {
        match self.ledger.mark_failed(key) {
            Ok(UpdateOutcome::Applied) => {}
            Ok(outcome) => {
                tracing::warn!("compensation skipped key={} outcome={:?}", label, outcome);
            }
            Err(err) => {
                metrics.record_compensation_failure();
                tracing::warn!("compensation failed key={} err={}", label, err);
            }
        }
    }

    fn fail_internal(
        &self,
        key: &ExecutionKey,
        label: &str,
        err: StoreError,
        metrics: &ReserveMetrics,
    ) -> ReserveOutcome {
        tracing::warn!("reserve store error key={} err={}", label, err);
        self.compensate(key, label, metrics);
        self.reject(RejectReason::InternalError, metrics)
    }
}
