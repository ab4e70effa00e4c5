//! Durable storage: attempt log, unit counter table.

pub mod attempt_log;
pub mod unit_counter;

pub use attempt_log::{AttemptLog, AttemptLogMetrics, ReplayOutcome};
pub use unit_counter::{CounterMetrics, ProvisionOutcome, UnitCounterTable};
