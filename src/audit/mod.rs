//! Balance reconciliation
//!
//! Replays the append-only transaction log of an account and checks it against
//! the stored balance and against the balances captured on each record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Money, TransactionRecord};
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

/// Result of replaying one account's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub account_id: Uuid,
    pub stored_balance: Money,
    /// Balance obtained by applying every successful record, oldest first
    pub replayed_balance: Money,
    pub records_checked: usize,
    /// Successful records whose captured balance disagrees with the replay
    pub mismatched_records: Vec<Uuid>,
    pub consistent: bool,
}

/// Reconciliation service
pub struct ReconciliationService<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> ReconciliationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Replay the log of `account_id` and compare it with the stored balance
    pub async fn reconcile(&self, account_id: Uuid) -> LedgerResult<ReconciliationReport> {
        let account = self
            .store
            .load(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let mut history = self.store.list_for_account(account_id, None).await?;
        history.reverse();

        let (replayed_balance, mismatched_records, replay_ok) = replay(account_id, &history);

        let consistent =
            replay_ok && mismatched_records.is_empty() && replayed_balance == account.balance();

        if consistent {
            tracing::debug!(%account_id, records = history.len(), "Account reconciled");
        } else {
            tracing::error!(
                %account_id,
                stored = %account.balance(),
                replayed = %replayed_balance,
                mismatched = mismatched_records.len(),
                "Account balance does not match its transaction log"
            );
        }

        Ok(ReconciliationReport {
            account_id,
            stored_balance: account.balance(),
            replayed_balance,
            records_checked: history.len(),
            mismatched_records,
            consistent,
        })
    }
}

/// Apply successful records in order. Failed records carry the balances seen
/// when they were rejected and may predate a concurrent commit, so they are
/// not compared.
fn replay(account_id: Uuid, history: &[TransactionRecord]) -> (Money, Vec<Uuid>, bool) {
    let mut running = Money::ZERO;
    let mut mismatched = Vec::new();

    for record in history.iter().filter(|r| r.is_success()) {
        if record.destination_id == Some(account_id) {
            match running.increase(&record.amount) {
                Ok(next) => running = next,
                Err(_) => return (running, mismatched, false),
            }
        }
        if record.origin_id == Some(account_id) {
            match running.decrease(&record.amount) {
                Ok(next) => running = next,
                // The log debits more than was ever credited
                Err(_) => return (running, mismatched, false),
            }
        }

        if record.balance_of(account_id) != Some(running) {
            mismatched.push(record.id);
        }
    }

    (running, mismatched, true)
}
