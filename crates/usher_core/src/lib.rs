#![forbid(unsafe_code)]

pub mod idempotency;
pub mod payment;
pub mod reservation;
