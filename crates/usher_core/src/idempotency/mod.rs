//! Idempotency primitives: execution-key derivation and log labels.

pub mod key;

pub use key::{ExecutionKey, format_key_digest, key_digest};
