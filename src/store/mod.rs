//! Store module
//!
//! Collaborator interfaces of the ledger: the account balance store and the
//! append-only transaction log, plus in-memory and PostgreSQL implementations.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::aggregate::{AccountBalance, BalanceUpdate};
use crate::domain::TransactionRecord;

pub use error::StoreError;
pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Balance updates and the record describing them, committed all-or-nothing
#[derive(Debug, Clone)]
pub struct BalanceMutation {
    pub updates: Vec<BalanceUpdate>,
    pub record: TransactionRecord,
}

/// Result of an atomic commit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// Every update and the record landed
    Committed,

    /// A balance changed since it was loaded; nothing was written
    VersionConflict { account_id: Uuid, expected: i64 },

    /// A record with the same idempotency key exists; nothing was written
    DuplicateIdempotencyKey(String),
}

/// Result of appending a record without balance updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendStatus {
    Appended,
    DuplicateIdempotencyKey(String),
}

/// Account balance store
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Create a zero balance. Returns `false` if the account already exists.
    async fn open(&self, account_id: Uuid) -> Result<bool, StoreError>;

    /// Load the current balance and version
    async fn load(&self, account_id: Uuid) -> Result<Option<AccountBalance>, StoreError>;

    /// Compare-and-swap every update and append the record in one transaction
    async fn commit(&self, mutation: &BalanceMutation) -> Result<CommitStatus, StoreError>;
}

/// Append-only transaction log
#[async_trait]
pub trait TransactionLog: Send + Sync {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError>;

    /// Append a record that changes no balance (failed attempts)
    async fn append(&self, record: &TransactionRecord) -> Result<AppendStatus, StoreError>;

    /// Records touching the account, newest first
    async fn list_for_account(
        &self,
        account_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// A store providing both collaborators over the same transactional backend
pub trait LedgerStore: BalanceStore + TransactionLog {}

impl<T: BalanceStore + TransactionLog> LedgerStore for T {}
