//! Purchase front door: input validation before the engine, status
//! mapping after.
//!
//! This is the library surface an HTTP/event adapter would call; no
//! transport lives here. Payment-token validation and identifier hygiene
//! run BEFORE the engine, so an invalid request leaves zero ledger and
//! counter state behind.

use usher_core::payment::validate_payment_token;
use usher_core::reservation::{RejectReason, ReserveOutcome};

use crate::engine::Engine;

/// Caller-facing message for a malformed requester or resource id.
pub const MSG_BAD_IDENTITY: &str =
    "Requester and resource ids must be non-empty and must not contain ':'.";
/// Caller-facing message for a duplicate in-flight purchase.
pub const MSG_IN_PROGRESS: &str = "Purchase already in progress.";
/// Caller-facing message for a key that already finished.
pub const MSG_ALREADY_PROCESSED: &str = "Purchase already processed.";
/// Caller-facing message for an unknown resource.
pub const MSG_NOT_FOUND: &str = "Resource does not exist.";
/// Caller-facing message for a depleted pool.
pub const MSG_SOLD_OUT: &str = "Units are sold out.";
/// Caller-facing message for a store failure or ambiguous outcome.
pub const MSG_INTERNAL: &str = "Internal server error.";
/// Caller-facing message for a granted reservation.
pub const MSG_SUCCESS: &str = "Unit reserved successfully.";

/// One inbound purchase request.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    /// Card number; validated by the pure payment predicate.
    pub payment_token: String,
    /// Requester identity.
    pub requester_id: String,
    /// Resource pool identity.
    pub resource_id: String,
}

/// Caller-facing purchase result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseResponse {
    /// HTTP-style status code an adapter can pass through.
    pub status: u16,
    /// Stable human-readable message.
    pub message: String,
    /// Post-decrement pool size on success.
    pub remaining: Option<u64>,
}

fn identity_ok(id: &str) -> bool {
    // ':' is the execution-key separator; allowing it would let two
    // distinct logical requests collide on one key.
    !id.is_empty() && !id.contains(':')
}

/// Handle one purchase request end to end.
pub fn handle_purchase(engine: &Engine, request: &PurchaseRequest) -> PurchaseResponse {
    let validation = validate_payment_token(&request.payment_token);
    if !validation.is_valid {
        return PurchaseResponse {
            status: 400,
            message: validation.message.to_string(),
            remaining: None,
        };
    }
    if !identity_ok(&request.requester_id) || !identity_ok(&request.resource_id) {
        return PurchaseResponse {
            status: 400,
            message: MSG_BAD_IDENTITY.to_string(),
            remaining: None,
        };
    }

    match engine.reserve(&request.requester_id, &request.resource_id) {
        ReserveOutcome::Granted { remaining } => PurchaseResponse {
            status: 200,
            message: MSG_SUCCESS.to_string(),
            remaining: Some(remaining),
        },
        ReserveOutcome::Rejected { reason } => {
            let (status, message) = match reason {
                RejectReason::DuplicateInProgress => (400, MSG_IN_PROGRESS),
                RejectReason::AlreadyProcessed => (400, MSG_ALREADY_PROCESSED),
                RejectReason::ResourceNotFound => (404, MSG_NOT_FOUND),
                RejectReason::ResourceExhausted => (400, MSG_SOLD_OUT),
                RejectReason::InternalError => (500, MSG_INTERNAL),
            };
            PurchaseResponse {
                status,
                message: message.to_string(),
                remaining: None,
            }
        }
    }
}
