use usher_core::payment::{MSG_INVALID, MSG_INVALID_TYPE, MSG_VALID, validate_payment_token};

#[test]
fn test_valid_visa_16_digits() {
    let result = validate_payment_token("4111111111111111");
    assert!(result.is_valid);
    assert_eq!(result.message, MSG_VALID);

    assert!(validate_payment_token("4012888888881881").is_valid);
}

#[test]
fn test_valid_visa_13_digits() {
    let result = validate_payment_token("4222222222222");
    assert!(result.is_valid);
    assert_eq!(result.message, MSG_VALID);
}

#[test]
fn test_valid_mastercard() {
    assert!(validate_payment_token("5555555555554444").is_valid);
    assert!(validate_payment_token("5105105105105100").is_valid);
}

#[test]
fn test_shape_valid_but_bad_checksum() {
    let result = validate_payment_token("4111111111111112");
    assert!(!result.is_valid);
    assert_eq!(result.message, MSG_INVALID);
}

#[test]
fn test_other_networks_rejected_by_type() {
    // Amex passes Luhn but is not an accepted card type.
    let result = validate_payment_token("378282246310005");
    assert!(!result.is_valid);
    assert_eq!(result.message, MSG_INVALID_TYPE);

    // Bankcard prefix 56 is outside the MasterCard 51-55 range.
    let result = validate_payment_token("5610591081018250");
    assert_eq!(result.message, MSG_INVALID_TYPE);
}

#[test]
fn test_malformed_tokens_rejected_by_type() {
    for token in [
        "",
        "4111",
        "4111-1111-1111-1111",
        "411111111111111a",
        "41111111111111112222",
    ] {
        let result = validate_payment_token(token);
        assert!(!result.is_valid, "token {token:?} must be rejected");
        assert_eq!(result.message, MSG_INVALID_TYPE);
    }
}
