//! Payment-token validation: a pure, stateless predicate consumed before
//! the reservation engine is ever invoked.
//!
//! Accepts Visa (13 or 16 digits, leading `4`) and MasterCard (16
//! digits, leading `51`-`55`); shape-valid numbers are then checked with
//! the Luhn algorithm. The engine must never be called for a token that
//! fails here; the purchase front door enforces that ordering.

/// Caller-facing message for a token that is not Visa or MasterCard.
pub const MSG_INVALID_TYPE: &str = "Invalid card type. Only Visa or MasterCard are accepted.";
/// Caller-facing message for a token that passes validation.
pub const MSG_VALID: &str = "Valid card.";
/// Caller-facing message for a shape-valid token with a bad checksum.
pub const MSG_INVALID: &str = "Invalid card.";

/// Result of validating a payment token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenValidation {
    /// Whether the token may be used.
    pub is_valid: bool,
    /// Stable caller-facing message.
    pub message: &'static str,
}

/// Validate a payment token.
pub fn validate_payment_token(token: &str) -> TokenValidation {
    if !is_visa(token) && !is_mastercard(token) {
        return TokenValidation {
            is_valid: false,
            message: MSG_INVALID_TYPE,
        };
    }
    if luhn_checksum_ok(token) {
        TokenValidation {
            is_valid: true,
            message: MSG_VALID,
        }
    } else {
        TokenValidation {
            is_valid: false,
            message: MSG_INVALID,
        }
    }
}

fn all_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_visa(token: &str) -> bool {
    all_digits(token) && (token.len() == 13 || token.len() == 16) && token.starts_with('4')
}

fn is_mastercard(token: &str) -> bool {
    if !all_digits(token) || token.len() != 16 {
        return false;
    }
    let bytes = token.as_bytes();
    bytes[0] == b'5' && (b'1'..=b'5').contains(&bytes[1])
}

/// Luhn checksum: double every second digit from the right, fold digits
/// above 9, sum must be divisible by 10.
fn luhn_checksum_ok(token: &str) -> bool {
    let sum: u32 = token
        .bytes()
        .rev()
        .enumerate()
        .map(|(idx, b)| {
            let digit = u32::from(b - b'0');
            if idx % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();
    sum % 10 == 0
}
