//! digital_wallet Library
//!
//! Wallet ledger core: the `Money` value type and the balance transfer
//! protocol over pluggable balance and transaction-log stores.

pub mod aggregate;
pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod idempotency;
pub mod ledger;
pub mod store;

mod error;

pub use config::{Config, ConfigError, LedgerConfig};
pub use domain::{
    Cancellation, Money, MoneyError, OperationContext, TransactionKind, TransactionRecord,
    TransferFailureReason, TransferState,
};
pub use error::{LedgerError, LedgerResult};
pub use handlers::{
    AmountInput, DepositCommand, TransferCommand, TransferOutcome, WithdrawCommand,
};
pub use ledger::Ledger;
pub use store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore, StoreError};
