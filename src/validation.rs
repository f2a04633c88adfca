//! Field-level validation for payout requests.

use std::fmt;

pub const PAYOUT_ID_MAX_LEN: usize = 128;
pub const IDEMPOTENCY_KEY_MIN_LEN: usize = 8;
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 128;
pub const STELLAR_ACCOUNT_LEN: usize = 56;
pub const AMOUNT_MAX_FRACTION_DIGITS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_payout_id(payout_id: &str) -> ValidationResult {
    if payout_id.trim().is_empty() {
        return Err(ValidationError::new("payout_id", "must not be empty"));
    }
    if payout_id.len() > PAYOUT_ID_MAX_LEN {
        return Err(ValidationError::new(
            "payout_id",
            format!("must be at most {} characters", PAYOUT_ID_MAX_LEN),
        ));
    }
    Ok(())
}

/// Stellar public account id: `G` followed by 55 base32 (A-Z, 2-7) characters.
pub fn validate_destination_account(account: &str) -> ValidationResult {
    if account.len() != STELLAR_ACCOUNT_LEN {
        return Err(ValidationError::new(
            "destination_account",
            format!("must be exactly {} characters", STELLAR_ACCOUNT_LEN),
        ));
    }
    if !account.starts_with('G') {
        return Err(ValidationError::new(
            "destination_account",
            "must start with 'G'",
        ));
    }
    if !account
        .chars()
        .skip(1)
        .all(|ch| ch.is_ascii_uppercase() || ('2'..='7').contains(&ch))
    {
        return Err(ValidationError::new(
            "destination_account",
            "must contain only A-Z and 2-7 after the leading 'G'",
        ));
    }
    Ok(())
}

/// Decimal amount string: digits, optionally a dot and 1-7 fraction digits.
pub fn validate_amount_format(amount: &str) -> ValidationResult {
    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (amount, None),
    };

    if whole.is_empty() || !whole.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new(
            "amount",
            "must be a decimal number with up to 7 fraction digits",
        ));
    }

    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(ValidationError::new(
                "amount",
                "must be a decimal number with up to 7 fraction digits",
            ));
        }
        if fraction.len() > AMOUNT_MAX_FRACTION_DIGITS {
            return Err(ValidationError::new(
                "amount",
                format!(
                    "must have at most {} fraction digits",
                    AMOUNT_MAX_FRACTION_DIGITS
                ),
            ));
        }
    }

    Ok(())
}

/// Idempotency keys: 8-128 characters from `[A-Za-z0-9:_-]`.
pub fn validate_idempotency_key(key: &str) -> ValidationResult {
    if key.len() < IDEMPOTENCY_KEY_MIN_LEN || key.len() > IDEMPOTENCY_KEY_MAX_LEN {
        return Err(ValidationError::new(
            "idempotency_key",
            format!(
                "must be between {} and {} characters",
                IDEMPOTENCY_KEY_MIN_LEN, IDEMPOTENCY_KEY_MAX_LEN
            ),
        ));
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == ':' || ch == '_' || ch == '-')
    {
        return Err(ValidationError::new(
            "idempotency_key",
            "must contain only letters, digits, ':', '_' or '-'",
        ));
    }
    Ok(())
}
