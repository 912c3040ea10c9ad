//! Error handling module
//!
//! Infrastructure and caller errors of the ledger. Business outcomes such as
//! insufficient balance are not errors; they are reported through
//! `TransferOutcome::Failed`.

use uuid::Uuid;

use crate::store::StoreError;

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Client errors
    #[error("Idempotency conflict: key {0} was already used with a different request")]
    IdempotencyConflict(String),

    #[error("Invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    #[error("Account already exists: {0}")]
    AccountExists(Uuid),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    // Aborted before commit
    #[error("Operation cancelled before commit")]
    Cancelled,

    #[error("Operation deadline exceeded before commit")]
    DeadlineExceeded,

    // Infrastructure errors
    #[error("Concurrent modification: gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl LedgerError {
    /// Check if this is a client error (caller's fault, do not retry)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::IdempotencyConflict(_)
                | Self::InvalidIdempotencyKey(_)
                | Self::AccountExists(_)
                | Self::AccountNotFound(_)
        )
    }

    /// Check if retrying the whole operation (with the same idempotency key) is safe
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled | Self::DeadlineExceeded | Self::RetriesExhausted { .. } => true,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
