//! Durable unit counter table: remaining units per resource.
//!
//! The table is the only contended shared value in the engine, and it is
//! only ever written through `conditional_decrement`: the guard
//! (`remaining >= amount`) and the subtraction happen under one lock, so
//! the store, not its callers, serializes concurrent decrements.
//!
//! Provisioning is an out-of-band setup operation; nothing in this module
//! ever increments an existing counter.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use usher_core::reservation::{CounterStore, DecrementOutcome, StoreError};

// --- Table event --------------------------------------------------------

/// Append-only counter event. `remaining` on a decrement is the
/// post-decrement value and is authoritative on replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CounterEvent {
    Provisioned {
        resource_id: String,
        units: u64,
    },
    Decremented {
        resource_id: String,
        amount: u64,
        remaining: u64,
    },
}

// --- Provision outcome --------------------------------------------------

/// Outcome of provisioning a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The resource was created with its initial unit count.
    Created,
    /// The resource already exists. Nothing changed; provisioning never
    /// tops up a live counter.
    AlreadyExists,
}

// --- Metrics ------------------------------------------------------------

/// Observability metrics for the counter table.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    decrements_total: AtomicU64,
    exhausted_total: AtomicU64,
    not_found_total: AtomicU64,
    write_errors_total: AtomicU64,
}

impl CounterMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_decrement(&self) {
        self.decrements_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_exhausted(&self) {
        self.exhausted_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_not_found(&self) {
        self.not_found_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write_error(&self) {
        self.write_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Total successful decrements.
    pub fn decrements_total(&self) -> u64 {
        self.decrements_total.load(Ordering::Relaxed)
    }

    /// Total decrements refused by the guard.
    pub fn exhausted_total(&self) -> u64 {
        self.exhausted_total.load(Ordering::Relaxed)
    }

    /// Total calls against unprovisioned resources.
    pub fn not_found_total(&self) -> u64 {
        self.not_found_total.load(Ordering::Relaxed)
    }

    /// Total append failures.
    pub fn write_errors_total(&self) -> u64 {
        self.write_errors_total.load(Ordering::Relaxed)
    }
}

// --- Counter table ------------------------------------------------------

#[derive(Debug)]
struct TableState {
    units: HashMap<String, u64>,
    storage_file: Option<File>,
}

/// Thread-safe unit counter table with bounded capacity and optional
/// JSONL persistence.
#[derive(Debug)]
pub struct UnitCounterTable {
    state: Mutex<TableState>,
    capacity: usize,
    metrics: CounterMetrics,
}

impl UnitCounterTable {
    /// Create a new in-memory counter table with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(TableState {
                units: HashMap::with_capacity(capacity),
                storage_file: None,
            }),
            capacity,
            metrics: CounterMetrics::new(),
        }
    }

    /// Create/load a counter table backed by a JSONL event file.
    pub fn with_storage_path(capacity: usize, storage_path: impl AsRef<Path>) -> io::Result<Self> {
        let path = storage_path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let events = read_events(path)?;
        let units = reduce_events(&events)
            .map_err(|reason| io::Error::new(io::ErrorKind::InvalidData, reason))?;
        if units.len() > capacity {
            let reason = format!(
                "counter table contains {} resources but capacity is {}",
                units.len(),
                capacity
            );
            return Err(io::Error::new(io::ErrorKind::InvalidInput, reason));
        }

        let storage_file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            state: Mutex::new(TableState {
                units,
                storage_file: Some(storage_file),
            }),
            capacity,
            metrics: CounterMetrics::new(),
        })
    }

    /// Provision a resource with its initial unit count (out-of-band
    /// setup; the engine itself only ever decrements).
    pub fn provision(&self, resource_id: &str, units: u64) -> Result<ProvisionOutcome, StoreError> {
        let mut state = self.state.lock().expect("counter table mutex poisoned");

        if state.units.contains_key(resource_id) {
            return Ok(ProvisionOutcome::AlreadyExists);
        }
        if state.units.len() >= self.capacity {
            self.metrics.record_write_error();
            return Err(StoreError::CapacityFull);
        }

        let event = CounterEvent::Provisioned {
            resource_id: resource_id.to_string(),
            units,
        };
        self.persist(&mut state, &event)?;

        state.units.insert(resource_id.to_string(), units);
        Ok(ProvisionOutcome::Created)
    }

    /// Number of provisioned resources.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("counter table mutex poisoned")
            .units
            .len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Table capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Observability counters.
    pub fn metrics(&self) -> &CounterMetrics {
        &self.metrics
    }

    fn persist(&self, state: &mut TableState, event: &CounterEvent) -> Result<(), StoreError> {
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

impl CounterStore for UnitCounterTable {
    fn conditional_decrement(
        &self,
        resource_id: &str,
        amount: u64,
    ) -> Result<DecrementOutcome, StoreError> {
        if amount == 0 {
            self.metrics.record_write_error();
            return Err(StoreError::WriteFailed {
                reason: "zero-amount decrement".to_string(),
            });
        }

        let mut state = self.state.lock().expect("counter table mutex poisoned");

        let remaining = match state.units.get(resource_id) {
            None => {
                self.metrics.record_not_found();
                return Ok(DecrementOutcome::NotFound);
            }
            Some(remaining) => *remaining,
        };
        if remaining < amount {
            self.metrics.record_exhausted();
            return Ok(DecrementOutcome::Exhausted { remaining });
        }

        let new_remaining = remaining - amount;
        let event = CounterEvent::Decremented {
            resource_id: resource_id.to_string(),
            amount,
            remaining: new_remaining,
        };
        self.persist(&mut state, &event)?;

        state.units.insert(resource_id.to_string(), new_remaining);
        self.metrics.record_decrement();
        Ok(DecrementOutcome::Decremented {
            remaining: new_remaining,
        })
    }

    fn units_remaining(&self, resource_id: &str) -> Result<Option<u64>, StoreError> {
        let state = self.state.lock().expect("counter table mutex poisoned");
        Ok(state.units.get(resource_id).copied())
    }
}

// --- Event file I/O -----------------------------------------------------

fn reduce_events(events: &[CounterEvent]) -> Result<HashMap<String, u64>, String> {
    let mut units: HashMap<String, u64> = HashMap::new();
    for event in events {
        match event {
            CounterEvent::Provisioned {
                resource_id,
                units: initial,
            } => {
                if units.insert(resource_id.clone(), *initial).is_some() {
                    return Err(format!("duplicate provision for resource: {resource_id}"));
                }
            }
            CounterEvent::Decremented {
                resource_id,
                amount,
                remaining,
            } => {
                let current = units
                    .get_mut(resource_id)
                    .ok_or_else(|| format!("decrement for unknown resource: {resource_id}"))?;
                if current
                    .checked_sub(*amount)
                    .is_none_or(|expected| expected != *remaining)
                {
                    return Err(format!(
                        "inconsistent decrement for resource {resource_id}: \
                         {current} - {amount} != {remaining}"
                    ));
                }
                *current = *remaining;
            }
        }
    }
    Ok(units)
}

fn append_event(file: &mut File, event: &CounterEvent) -> io::Result<()> {
    let line = serde_json::to_string(event).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to encode counter event: {e}"),
        )
    })?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()
}

fn read_events(path: &Path) -> io::Result<Vec<CounterEvent>> {
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
        let event: CounterEvent = serde_json::from_str(trimmed).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "invalid counter event at line {} in {}: {e}",
                    index + 1,
                    path.display()
                ),
            )
        })?;
        events.push(event);
    }

    Ok(events)
}
