//! Shared test support: in-memory store fakes and fault injection.
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use usher_core::idempotency::ExecutionKey;
use usher_core::reservation::{
    AttemptRecord, AttemptState, CounterStore, CreateOutcome, DecrementOutcome, LedgerStore,
    StoreError, UpdateOutcome,
};

// --- In-memory fakes ----------------------------------------------------

/// Minimal in-memory ledger store for coordinator tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, AttemptRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the record for (requester, resource), if any.
    pub fn state_of(&self, requester_id: &str, resource_id: &str) -> Option<AttemptState> {
        let key = ExecutionKey::derive(requester_id, resource_id);
        self.records
            .lock()
            .expect("memory ledger mutex poisoned")
            .get(key.as_str())
            .map(|r| r.state)
    }

    /// Plant a record directly (test setup).
    pub fn plant(&self, record: AttemptRecord) {
        self.records
            .lock()
            .expect("memory ledger mutex poisoned")
            .insert(record.key.as_str().to_string(), record);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("memory ledger mutex poisoned")
            .len()
    }
}

impl LedgerStore for MemoryLedger {
    fn create_if_absent(&self, record: AttemptRecord) -> Result<CreateOutcome, StoreError> {
        let mut records = self.records.lock().expect("memory ledger mutex poisoned");
        if let Some(existing) = records.get(record.key.as_str()) {
            return Ok(CreateOutcome::AlreadyExists(existing.clone()));
        }
        records.insert(record.key.as_str().to_string(), record);
        Ok(CreateOutcome::Created)
    }

    fn conditional_update(
        &self,
        key: &ExecutionKey,
        expected: AttemptState,
        next: AttemptState,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut records = self.records.lock().expect("memory ledger mutex poisoned");
        match records.get_mut(key.as_str()) {
            None => Ok(UpdateOutcome::NotFound),
            Some(record) if record.state != expected => Ok(UpdateOutcome::PreconditionFailed {
                actual: record.state,
            }),
            Some(record) => {
                record.state = next;
                Ok(UpdateOutcome::Applied)
            }
        }
    }

    fn get(&self, key: &ExecutionKey) -> Result<Option<AttemptRecord>, StoreError> {
        let records = self.records.lock().expect("memory ledger mutex poisoned");
        Ok(records.get(key.as_str()).cloned())
    }
}

/// Minimal in-memory counter store for coordinator tests.
#[derive(Debug, Default)]
pub struct MemoryCounter {
    units: Mutex<HashMap<String, u64>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provision(&self, resource_id: &str, units: u64) {
        self.units
            .lock()
            .expect("memory counter mutex poisoned")
            .insert(resource_id.to_string(), units);
    }

    pub fn remaining(&self, resource_id: &str) -> Option<u64> {
        self.units
            .lock()
            .expect("memory counter mutex poisoned")
            .get(resource_id)
            .copied()
    }
}

impl CounterStore for MemoryCounter {
    fn conditional_decrement(
        &self,
        resource_id: &str,
        amount: u64,
    ) -> Result<DecrementOutcome, StoreError> {
        let mut units = self.units.lock().expect("memory counter mutex poisoned");
        let remaining = match units.get(resource_id) {
            None => return Ok(DecrementOutcome::NotFound),
            Some(remaining) => *remaining,
        };
        if remaining < amount {
            return Ok(DecrementOutcome::Exhausted { remaining });
        }
        let new_remaining = remaining - amount;
        units.insert(resource_id.to_string(), new_remaining);
        Ok(DecrementOutcome::Decremented {
            remaining: new_remaining,
        })
    }

    fn units_remaining(&self, resource_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .units
            .lock()
            .expect("memory counter mutex poisoned")
            .get(resource_id)
            .copied())
    }
}

// --- Fault injection ----------------------------------------------------

/// Which ledger operation a fault targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    Create,
    Update,
}

/// Ledger wrapper that fails selected operations with a store error.
pub struct FaultyLedger {
    pub inner: MemoryLedger,
    fail_on: Mutex<Vec<LedgerOp>>,
}

impl FaultyLedger {
    pub fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            fail_on: Mutex::new(Vec::new()),
        }
    }

    /// Make `op` fail from now on.
    pub fn fail(&self, op: LedgerOp) {
        self.fail_on
            .lock()
            .expect("fault list mutex poisoned")
            .push(op);
    }

    fn should_fail(&self, op: LedgerOp) -> bool {
        self.fail_on
            .lock()
            .expect("fault list mutex poisoned")
            .contains(&op)
    }
}

impl LedgerStore for FaultyLedger {
    fn create_if_absent(&self, record: AttemptRecord) -> Result<CreateOutcome, StoreError> {
        if self.should_fail(LedgerOp::Create) {
            return Err(StoreError::WriteFailed {
                reason: "injected create fault".to_string(),
            });
        }
        self.inner.create_if_absent(record)
    }

    fn conditional_update(
        &self,
        key: &ExecutionKey,
        expected: AttemptState,
        next: AttemptState,
    ) -> Result<UpdateOutcome, StoreError> {
        if self.should_fail(LedgerOp::Update) {
            return Err(StoreError::WriteFailed {
                reason: "injected update fault".to_string(),
            });
        }
        self.inner.conditional_update(key, expected, next)
    }

    fn get(&self, key: &ExecutionKey) -> Result<Option<AttemptRecord>, StoreError> {
        self.inner.get(key)
    }
}

/// Counter wrapper that fails the decrement with a configurable error.
pub struct FaultyCounter {
    pub inner: MemoryCounter,
    decrement_error: Mutex<Option<StoreError>>,
}

impl FaultyCounter {
    pub fn new(inner: MemoryCounter) -> Self {
        Self {
            inner,
            decrement_error: Mutex::new(None),
        }
    }

    /// Make the next and all following decrements fail with `err`.
    pub fn fail_decrement(&self, err: StoreError) {
        *self.decrement_error.lock().expect("fault mutex poisoned") = Some(err);
    }
}

impl CounterStore for FaultyCounter {
    fn conditional_decrement(
        &self,
        resource_id: &str,
        amount: u64,
    ) -> Result<DecrementOutcome, StoreError> {
        if let Some(err) = self
            .decrement_error
            .lock()
            .expect("fault mutex poisoned")
            .clone()
        {
            return Err(err);
        }
        self.inner.conditional_decrement(resource_id, amount)
    }

    fn units_remaining(&self, resource_id: &str) -> Result<Option<u64>, StoreError> {
        self.inner.units_remaining(resource_id)
    }
}
