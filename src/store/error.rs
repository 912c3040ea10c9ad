//! Store Errors
//!
//! Faults of the balance store and transaction log. A version conflict or a
//! duplicate idempotency key is not a fault; those are reported as
//! `CommitStatus` values.

/// Errors that can occur in a ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The commit was sent but its outcome is unknown
    #[error("Commit outcome unknown: {0}")]
    CommitUncertain(String),

    /// Stored data violates a domain invariant
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_) | StoreError::Unavailable(_) | StoreError::CommitUncertain(_)
        )
    }
}
