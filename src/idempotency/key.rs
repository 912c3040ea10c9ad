//! Idempotency keys and request fingerprints

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::{Money, TransactionKind};
use crate::error::LedgerError;

/// Longest accepted key
pub const MAX_KEY_LEN: usize = 128;

/// Validated idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate a raw key. Surrounding whitespace is ignored.
    pub fn new(raw: impl Into<String>) -> Result<Self, LedgerError> {
        let raw = raw.into();
        let key = raw.trim();

        if key.is_empty() {
            return Err(LedgerError::InvalidIdempotencyKey("key is empty".to_string()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(LedgerError::InvalidIdempotencyKey(format!(
                "key longer than {MAX_KEY_LEN} bytes"
            )));
        }
        if key.chars().any(char::is_control) {
            return Err(LedgerError::InvalidIdempotencyKey(
                "key contains control characters".to_string(),
            ));
        }

        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IdempotencyKey::new(value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

/// Compute SHA-256 fingerprint of the logical request for conflict detection.
///
/// The amount is normalized, so `40` and `40.00` describe the same request.
/// The description is not part of the fingerprint.
pub fn request_fingerprint(
    kind: TransactionKind,
    origin_id: Option<Uuid>,
    destination_id: Option<Uuid>,
    amount: &Money,
) -> String {
    use sha2::{Digest, Sha256};

    let origin = origin_id.map(|id| id.to_string()).unwrap_or_default();
    let destination = destination_id.map(|id| id.to_string()).unwrap_or_default();
    let canonical = format!(
        "{kind}|{origin}|{destination}|{}",
        amount.value().normalize()
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_key_is_trimmed() {
        let key = IdempotencyKey::new("  trace-42 ").unwrap();
        assert_eq!(key.as_str(), "trace-42");
    }

    #[test]
    fn test_invalid_keys() {
        assert!(IdempotencyKey::new("   ").is_err());
        assert!(IdempotencyKey::new("a".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(IdempotencyKey::new("line\nbreak").is_err());
        assert!(IdempotencyKey::new("a".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn test_fingerprint_normalizes_amount() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let forty = Money::new(dec!(40)).unwrap();
        let forty_cents = Money::new(dec!(40.00)).unwrap();

        let hash = request_fingerprint(TransactionKind::Transfer, Some(a), Some(b), &forty);
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            request_fingerprint(TransactionKind::Transfer, Some(a), Some(b), &forty_cents)
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_requests() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let amount = Money::new(dec!(40)).unwrap();
        let base = request_fingerprint(TransactionKind::Transfer, Some(a), Some(b), &amount);

        let other_amount = Money::new(dec!(41)).unwrap();
        assert_ne!(
            base,
            request_fingerprint(TransactionKind::Transfer, Some(a), Some(b), &other_amount)
        );
        assert_ne!(
            base,
            request_fingerprint(TransactionKind::Transfer, Some(b), Some(a), &amount)
        );
        assert_ne!(
            base,
            request_fingerprint(TransactionKind::Deposit, None, Some(b), &amount)
        );
        assert_ne!(
            request_fingerprint(TransactionKind::Deposit, None, Some(a), &amount),
            request_fingerprint(TransactionKind::Withdrawal, Some(a), None, &amount)
        );
    }
}
