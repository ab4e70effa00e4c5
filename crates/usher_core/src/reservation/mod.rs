//! Reservation engine: attempt lifecycle, store seams, and the
//! coordinator state machine.

pub mod attempt;
pub mod coordinator;
pub mod ledger;
pub mod outcome;
pub mod store;

pub use attempt::{AttemptRecord, AttemptState};
pub use coordinator::{Coordinator, CoordinatorConfig, ReserveMetrics};
pub use ledger::{BeginOutcome, Ledger, ReopenOutcome};
pub use outcome::{RejectReason, ReserveOutcome, reject_reason_registry};
pub use store::{
    CounterStore, CreateOutcome, DecrementOutcome, LedgerStore, StoreError, UpdateOutcome,
};
