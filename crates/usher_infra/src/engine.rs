//! Engine wiring: durable stores, coordinator policy, and the
//! cross-cutting timing wrapper around reserve operations.
//!
//! The core coordinator is clock-free; wall-clock timestamps and elapsed
//! time are injected and measured here, outside the state machine.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use usher_core::idempotency::{ExecutionKey, format_key_digest, key_digest};
use usher_core::reservation::{
    Coordinator, CoordinatorConfig, LedgerStore, ReserveMetrics, ReserveOutcome, StoreError,
};

use crate::config::EngineConfig;
use crate::health::HealthResponse;
use crate::store::{AttemptLog, ProvisionOutcome, ReplayOutcome, UnitCounterTable};

// --- Timing metrics -----------------------------------------------------

/// Elapsed-time counters for reserve operations (sum + count).
#[derive(Debug, Default)]
pub struct ReserveTimings {
    elapsed_ms_total: AtomicU64,
    ops_total: AtomicU64,
}

impl ReserveTimings {
    /// Create a new timings tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, elapsed_ms: u64) {
        self.elapsed_ms_total.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.ops_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Total elapsed milliseconds across all operations.
    pub fn elapsed_ms_total(&self) -> u64 {
        self.elapsed_ms_total.load(Ordering::Relaxed)
    }

    /// Number of operations recorded.
    pub fn ops_total(&self) -> u64 {
        self.ops_total.load(Ordering::Relaxed)
    }
}

// --- Engine -------------------------------------------------------------

/// The reservation engine: stores, policy, metrics, timing.
///
/// Shareable across threads behind an `Arc`; all coordination happens in
/// the stores' atomic conditional operations.
pub struct Engine {
    attempt_log: Arc<AttemptLog>,
    counters: Arc<UnitCounterTable>,
    coordinator_config: CoordinatorConfig,
    stale_attempt_alert_s: u64,
    reserve_metrics: ReserveMetrics,
    timings: ReserveTimings,
}

impl Engine {
    /// Build an engine over in-memory stores (tests, ephemeral use).
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::assemble(
            AttemptLog::new(config.ledger_capacity),
            UnitCounterTable::new(config.counter_capacity),
            config,
        )
    }

    /// Build an engine over durable JSONL-backed stores, replaying any
    /// existing event files.
    pub fn open(
        config: &EngineConfig,
        ledger_path: impl AsRef<Path>,
        counter_path: impl AsRef<Path>,
    ) -> io::Result<Self> {
        let attempt_log = AttemptLog::with_storage_path(config.ledger_capacity, ledger_path)?;
        let counters = UnitCounterTable::with_storage_path(config.counter_capacity, counter_path)?;
        Ok(Self::assemble(attempt_log, counters, config))
    }

    fn assemble(attempt_log: AttemptLog, counters: UnitCounterTable, config: &EngineConfig) -> Self {
        Self {
            attempt_log: Arc::new(attempt_log),
            counters: Arc::new(counters),
            coordinator_config: CoordinatorConfig {
                allow_retry_after_terminal: config.allow_retry_after_terminal,
            },
            stale_attempt_alert_s: config.stale_attempt_alert_s,
            reserve_metrics: ReserveMetrics::new(),
            timings: ReserveTimings::new(),
        }
    }

    /// Startup replay summary. Logs one warning per crash remnant so the
    /// stale claims are visible without querying the store.
    pub fn startup_report(&self) -> ReplayOutcome {
        let outcome = self.attempt_log.replay();
        if outcome.in_flight_count > 0 {
            tracing::warn!(
                "replay found {} in-flight attempts of {} records",
                outcome.in_flight_count,
                outcome.records_replayed
            );
            for key in &outcome.in_flight_keys {
                tracing::warn!("in-flight attempt key={}", key);
            }
        } else {
            tracing::info!("replay clean: {} records", outcome.records_replayed);
        }
        outcome
    }

    /// Provision a resource pool (out-of-band setup).
    pub fn provision(&self, resource_id: &str, units: u64) -> Result<ProvisionOutcome, StoreError> {
        self.counters.provision(resource_id, units)
    }

    /// Reserve one unit of `resource_id` for `requester_id`, timed and
    /// logged as a single event per operation.
    pub fn reserve(&self, requester_id: &str, resource_id: &str) -> ReserveOutcome {
        let started = Instant::now();
        let coordinator = Coordinator::new(
            self.attempt_log.as_ref(),
            self.counters.as_ref(),
            self.coordinator_config,
        );
        let outcome =
            coordinator.reserve(requester_id, resource_id, epoch_ms(), &self.reserve_metrics);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.timings.record(elapsed_ms);

        let label = format_key_digest(key_digest(requester_id, resource_id));
        match &outcome {
            ReserveOutcome::Granted { remaining } => {
                tracing::info!(
                    "reserve granted key={} remaining={} elapsed_ms={}",
                    label,
                    remaining,
                    elapsed_ms
                );
            }
            ReserveOutcome::Rejected { reason } => {
                tracing::info!(
                    "reserve rejected key={} reason={} elapsed_ms={}",
                    label,
                    reason.as_str(),
                    elapsed_ms
                );
            }
        }
        outcome
    }

    /// Keys of in-flight attempts older than the stale alert threshold.
    pub fn stale_in_flight(&self, now_ms: u64) -> Vec<String> {
        let cutoff = now_ms.saturating_sub(self.stale_attempt_alert_s.saturating_mul(1000));
        let replay = self.attempt_log.replay();
        replay
            .in_flight_keys
            .into_iter()
            .filter(|key| {
                let key = ExecutionKey::from_canonical(key.clone());
                match self.attempt_log.get(&key) {
                    Ok(Some(record)) => record.created_ms <= cutoff,
                    _ => false,
                }
            })
            .collect()
    }

    /// Health snapshot for an operator endpoint.
    pub fn health(&self, build_id: &str) -> HealthResponse {
        let replay = self.attempt_log.replay();
        let stale = self.stale_in_flight(epoch_ms()).len();
        HealthResponse::healthy(build_id, replay.in_flight_count, stale)
    }

    /// Reserve operation counters.
    pub fn reserve_metrics(&self) -> &ReserveMetrics {
        &self.reserve_metrics
    }

    /// Reserve timing counters.
    pub fn timings(&self) -> &ReserveTimings {
        &self.timings
    }

    /// The attempt log (audit/inspection).
    pub fn attempt_log(&self) -> &AttemptLog {
        &self.attempt_log
    }

    /// The counter table (inspection).
    pub fn counters(&self) -> &UnitCounterTable {
        &self.counters
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
