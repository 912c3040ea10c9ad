//! Domain module
//!
//! Core domain types: money, transaction records and operation metadata.

pub mod cancel;
pub mod context;
pub mod money;
pub mod record;

pub use cancel::Cancellation;
pub use context::OperationContext;
pub use money::{Money, MoneyError};
pub use record::{
    PendingRecord, TransactionKind, TransactionRecord, TransferFailureReason, TransferState,
};
