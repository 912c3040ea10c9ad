//! Cancellation
//!
//! Caller-supplied cancellation flag and deadline. The ledger checks it before
//! every step that precedes the atomic commit; the commit itself is never
//! interrupted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::LedgerError;

/// Cancellation signal shared between a caller and a running operation.
///
/// Clones share the same flag, so a caller can keep one clone and cancel the
/// operation holding the other.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A signal that never fires unless `cancel` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort once `deadline` has passed
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abort once `timeout` has elapsed from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if the operation must not proceed.
    pub fn check(&self) -> Result<(), LedgerError> {
        if self.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(LedgerError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Run a pre-commit step, bounded by the deadline.
    pub async fn guard<F, T>(&self, step: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        self.check()?;
        let result = match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, step)
                .await
                .map_err(|_| LedgerError::DeadlineExceeded)?,
            None => step.await,
        };
        self.check()?;
        result
    }
}
