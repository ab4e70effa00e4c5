//! Durable attempt log: the idempotency ledger's storage.
//!
//! Every claim and state transition is captured as an append-only JSONL
//! event; on open, replay reduces the event stream into the latest
//! per-key view. The in-memory map and the conditional checks live under
//! one mutex, which is what makes `create_if_absent` and
//! `conditional_update` single atomic operations.
//!
//! Events are persisted before they are applied: a failed append leaves
//! no phantom record in memory.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use usher_core::idempotency::ExecutionKey;
use usher_core::reservation::{
    AttemptRecord, AttemptState, CreateOutcome, LedgerStore, StoreError, UpdateOutcome,
};

// --- Persisted state ----------------------------------------------------

/// Attempt lifecycle state as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PersistedState {
    InProgress,
    Completed,
    Failed,
}

fn to_core_state(state: PersistedState) -> AttemptState {
    match state {
        PersistedState::InProgress => AttemptState::InProgress,
        PersistedState::Completed => AttemptState::Completed,
        PersistedState::Failed => AttemptState::Failed,
    }
}

fn from_core_state(state: AttemptState) -> PersistedState {
    match state {
        AttemptState::InProgress => PersistedState::InProgress,
        AttemptState::Completed => PersistedState::Completed,
        AttemptState::Failed => PersistedState::Failed,
    }
}

/// Persisted attempt record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedAttempt {
    key: String,
    requester_id: String,
    resource_id: String,
    state: PersistedState,
    created_ms: u64,
}

fn to_core_record(record: &PersistedAttempt) -> AttemptRecord {
    AttemptRecord {
        key: ExecutionKey::from_canonical(record.key.clone()),
        requester_id: record.requester_id.clone(),
        resource_id: record.resource_id.clone(),
        state: to_core_state(record.state),
        created_ms: record.created_ms,
    }
}

fn from_core_record(record: &AttemptRecord) -> PersistedAttempt {
    PersistedAttempt {
        key: record.key.as_str().to_string(),
        requester_id: record.requester_id.clone(),
        resource_id: record.resource_id.clone(),
        state: from_core_state(record.state),
        created_ms: record.created_ms,
    }
}

// --- Log event ----------------------------------------------------------

/// Append-only log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum LogEvent {
    AttemptOpened {
        record: PersistedAttempt,
    },
    StateChanged {
        key: String,
        from: PersistedState,
        to: PersistedState,
    },
}

// --- Replay outcome -----------------------------------------------------

/// Outcome of replaying the log on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Number of attempt records reconstructed.
    pub records_replayed: usize,
    /// Number of attempts still `InProgress` (crash remnants).
    pub in_flight_count: usize,
    /// Keys of the in-flight attempts, for operator reconciliation.
    pub in_flight_keys: Vec<String>,
}

// --- Metrics ------------------------------------------------------------

/// Observability metrics for the attempt log.
#[derive(Debug, Default)]
pub struct AttemptLogMetrics {
    opens_total: AtomicU64,
    duplicates_total: AtomicU64,
    transitions_total: AtomicU64,
    precondition_failures_total: AtomicU64,
    write_errors_total: AtomicU64,
}

impl AttemptLogMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_open(&self) {
        self.opens_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_duplicate(&self) {
        self.duplicates_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_transition(&self) {
        self.transitions_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_precondition_failure(&self) {
        self.precondition_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_write_error(&self) {
        self.write_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Total attempts opened.
    pub fn opens_total(&self) -> u64 {
        self.opens_total.load(Ordering::Relaxed)
    }

    /// Total create calls that hit an existing key.
    pub fn duplicates_total(&self) -> u64 {
        self.duplicates_total.load(Ordering::Relaxed)
    }

    /// Total applied state transitions.
    pub fn transitions_total(&self) -> u64 {
        self.transitions_total.load(Ordering::Relaxed)
    }

    /// Total conditional updates that missed their expected state.
    pub fn precondition_failures_total(&self) -> u64 {
        self.precondition_failures_total.load(Ordering::Relaxed)
    }

    /// Total append failures.
    pub fn write_errors_total(&self) -> u64 {
        self.write_errors_total.load(Ordering::Relaxed)
    }
}

// --- Attempt log --------------------------------------------------------

#[derive(Debug)]
struct LogState {
    records: HashMap<String, PersistedAttempt>,
    storage_file: Option<File>,
}

/// Thread-safe attempt log with bounded capacity and optional JSONL
/// persistence.
#[derive(Debug)]
pub struct AttemptLog {
    state: Mutex<LogState>,
    capacity: usize,
    metrics: AttemptLogMetrics,
}

impl AttemptLog {
    /// Create a new in-memory attempt log with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LogState {
                records: HashMap::with_capacity(capacity),
                storage_file: None,
            }),
            capacity,
            metrics: AttemptLogMetrics::new(),
        }
    }

    /// Create/load an attempt log backed by a JSONL event file.
    pub fn with_storage_path(capacity: usize, storage_path: impl AsRef<Path>) -> io::Result<Self> {
        let path = storage_path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let events = read_events(path)?;
        let records = reduce_events(&events)
            .map_err(|reason| io::Error::new(io::ErrorKind::InvalidData, reason))?;
        if records.len() > capacity {
            let reason = format!(
                "attempt log contains {} records but capacity is {}",
                records.len(),
                capacity
            );
            return Err(io::Error::new(io::ErrorKind::InvalidInput, reason));
        }

        let storage_file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            state: Mutex::new(LogState {
                records,
                storage_file: Some(storage_file),
            }),
            capacity,
            metrics: AttemptLogMetrics::new(),
        })
    }

    /// Replay summary: reconstructed records and crash remnants.
    pub fn replay(&self) -> ReplayOutcome {
        let state = self.state.lock().expect("attempt log mutex poisoned");
        let mut in_flight_keys: Vec<String> = state
            .records
            .values()
            .filter(|r| r.state == PersistedState::InProgress)
            .map(|r| r.key.clone())
            .collect();
        in_flight_keys.sort();

        ReplayOutcome {
            records_replayed: state.records.len(),
            in_flight_count: in_flight_keys.len(),
            in_flight_keys,
        }
    }

    /// Number of tracked attempts.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("attempt log mutex poisoned")
            .records
            .len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Observability counters.
    pub fn metrics(&self) -> &AttemptLogMetrics {
        &self.metrics
    }

    fn persist(&self, state: &mut LogState, event: &LogEvent) -> Result<(), StoreError> {
        if let Some(file) = state.storage_file.as_mut() {
            append_event(file, event).map_err(|e| {
                self.metrics.record_write_error();
                StoreError::WriteFailed {
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }
}

impl LedgerStore for AttemptLog {
    fn create_if_absent(&self, record: AttemptRecord) -> Result<CreateOutcome, StoreError> {
        let mut state = self.state.lock().expect("attempt log mutex poisoned");

        if let Some(existing) = state.records.get(record.key.as_str()) {
            self.metrics.record_duplicate();
            return Ok(CreateOutcome::AlreadyExists(to_core_record(existing)));
        }
        if state.records.len() >= self.capacity {
            self.metrics.record_write_error();
            return Err(StoreError::CapacityFull);
        }

        let persisted = from_core_record(&record);
        let event = LogEvent::AttemptOpened {
            record: persisted.clone(),
        };
        self.persist(&mut state, &event)?;

        state.records.insert(persisted.key.clone(), persisted);
        self.metrics.record_open();
        Ok(CreateOutcome::Created)
    }

    fn conditional_update(
        &self,
        key: &ExecutionKey,
        expected: AttemptState,
        next: AttemptState,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut state = self.state.lock().expect("attempt log mutex poisoned");

        let actual = match state.records.get(key.as_str()) {
            None => {
                self.metrics.record_precondition_failure();
                return Ok(UpdateOutcome::NotFound);
            }
            Some(record) => record.state,
        };
        if actual != from_core_state(expected) {
            self.metrics.record_precondition_failure();
            return Ok(UpdateOutcome::PreconditionFailed {
                actual: to_core_state(actual),
            });
        }

        let event = LogEvent::StateChanged {
            key: key.as_str().to_string(),
            from: actual,
            to: from_core_state(next),
        };
        self.persist(&mut state, &event)?;

        if let Some(record) = state.records.get_mut(key.as_str()) {
            record.state = from_core_state(next);
        }
        self.metrics.record_transition();
        Ok(UpdateOutcome::Applied)
    }

    fn get(&self, key: &ExecutionKey) -> Result<Option<AttemptRecord>, StoreError> {
        let state = self.state.lock().expect("attempt log mutex poisoned");
        Ok(state.records.get(key.as_str()).map(to_core_record))
    }
}

// --- Event file I/O -----------------------------------------------------

fn reduce_events(events: &[LogEvent]) -> Result<HashMap<String, PersistedAttempt>, String> {
    let mut records: HashMap<String, PersistedAttempt> = HashMap::new();
    for event in events {
        match event {
            LogEvent::AttemptOpened { record } => {
                // Reopens are state changes; a second open for a key means
                // the log was tampered with or mis-merged.
                if records
                    .insert(record.key.clone(), record.clone())
                    .is_some()
                {
                    return Err(format!("duplicate open for key: {}", record.key));
                }
            }
            LogEvent::StateChanged { key, to, .. } => {
                let record = records
                    .get_mut(key)
                    .ok_or_else(|| format!("state change for unknown key: {key}"))?;
                record.state = *to;
            }
        }
    }
    Ok(records)
}

fn append_event(file: &mut File, event: &LogEvent) -> io::Result<()> {
    let line = serde_json::to_string(event).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to encode attempt log event: {e}"),
        )
    })?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()
}

fn read_events(path: &Path) -> io::Result<Vec<LogEvent>> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let reader = BufReader::new(file);

    let mut events = Vec::new();
    for (index, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: LogEvent = serde_json::from_str(trimmed).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "invalid attempt log event at line {} in {}: {e}",
                    index + 1,
                    path.display()
                ),
            )
        })?;
        events.push(event);
    }

    Ok(events)
}
