//! In-memory ledger store
//!
//! Single-process implementation of both store traits. A commit validates every
//! version and the idempotency key under one lock before applying anything, so
//! it has the same all-or-nothing behaviour as the PostgreSQL store.
//! Fault injection hooks let tests simulate an unreliable backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::aggregate::AccountBalance;
use crate::domain::TransactionRecord;

use super::{AppendStatus, BalanceMutation, BalanceStore, CommitStatus, StoreError, TransactionLog};

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Uuid, AccountBalance>,
    /// Append order is history order
    records: Vec<TransactionRecord>,
    by_key: HashMap<String, usize>,
}

impl LedgerState {
    fn push_record(&mut self, record: &TransactionRecord) {
        if let Some(key) = &record.idempotency_key {
            self.by_key.insert(key.clone(), self.records.len());
        }
        self.records.push(record.clone());
    }

    fn has_key(&self, record: &TransactionRecord) -> Option<String> {
        record
            .idempotency_key
            .as_ref()
            .filter(|key| self.by_key.contains_key(*key))
            .cloned()
    }
}

/// In-memory ledger store
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
    unavailable: AtomicBool,
    failing_commits: AtomicUsize,
    conflicting_commits: AtomicUsize,
    load_delay_ms: AtomicU64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `count` commits with `StoreError::Unavailable`, writing nothing
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Report a version conflict on the next `count` commits, writing nothing
    pub fn conflict_next_commits(&self, count: usize) {
        self.conflicting_commits.store(count, Ordering::SeqCst);
    }

    /// Delay every balance load, to exercise deadlines
    pub fn set_load_delay(&self, delay: Duration) {
        self.load_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of records in the log
    pub async fn record_count(&self) -> usize {
        self.state.lock().await.records.len()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    fn take_commit_fault(&self) -> bool {
        take_one(&self.failing_commits)
    }

    fn take_commit_conflict(&self) -> bool {
        take_one(&self.conflicting_commits)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl BalanceStore for InMemoryLedgerStore {
    async fn open(&self, account_id: Uuid) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        if state.balances.contains_key(&account_id) {
            return Ok(false);
        }
        state
            .balances
            .insert(account_id, AccountBalance::open(account_id));
        Ok(true)
    }

    async fn load(&self, account_id: Uuid) -> Result<Option<AccountBalance>, StoreError> {
        self.ensure_available()?;

        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Ok(self.state.lock().await.balances.get(&account_id).cloned())
    }

    async fn commit(&self, mutation: &BalanceMutation) -> Result<CommitStatus, StoreError> {
        self.ensure_available()?;
        if self.take_commit_fault() {
            return Err(StoreError::Unavailable("injected commit fault".to_string()));
        }
        if let Some(update) = mutation.updates.first().filter(|_| self.take_commit_conflict()) {
            return Ok(CommitStatus::VersionConflict {
                account_id: update.account_id,
                expected: update.expected_version,
            });
        }

        let mut state = self.state.lock().await;

        for update in &mutation.updates {
            let current = state
                .balances
                .get(&update.account_id)
                .map(|account| account.version());
            if current != Some(update.expected_version) {
                return Ok(CommitStatus::VersionConflict {
                    account_id: update.account_id,
                    expected: update.expected_version,
                });
            }
        }

        if let Some(key) = state.has_key(&mutation.record) {
            return Ok(CommitStatus::DuplicateIdempotencyKey(key));
        }

        for update in &mutation.updates {
            if let Some(account) = state.balances.get_mut(&update.account_id) {
                *account = account.apply(update);
            }
        }
        state.push_record(&mutation.record);

        Ok(CommitStatus::Committed)
    }
}

#[async_trait]
impl TransactionLog for InMemoryLedgerStore {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .by_key
            .get(key)
            .and_then(|idx| state.records.get(*idx))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state.records.iter().find(|r| r.id == id).cloned())
    }

    async fn append(&self, record: &TransactionRecord) -> Result<AppendStatus, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        if let Some(key) = state.has_key(record) {
            return Ok(AppendStatus::DuplicateIdempotencyKey(key));
        }
        state.push_record(record);
        Ok(AppendStatus::Appended)
    }

    async fn list_for_account(
        &self,
        account_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|r| r.touches(account_id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
