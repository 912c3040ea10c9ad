//! Ledger facade
//!
//! Single entry point over a `LedgerStore`: the transfer, deposit and
//! withdrawal handlers plus account, history and reconciliation queries.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{ReconciliationReport, ReconciliationService};
use crate::config::LedgerConfig;
use crate::domain::{Cancellation, Money, OperationContext, TransactionRecord};
use crate::error::{LedgerError, LedgerResult};
use crate::handlers::{
    DepositCommand, DepositHandler, TransferCommand, TransferHandler, TransferOutcome,
    WithdrawCommand, WithdrawHandler,
};
use crate::idempotency::IdempotencyKey;
use crate::store::LedgerStore;

/// Wallet ledger over a store backend
pub struct Ledger<S> {
    store: Arc<S>,
    transfers: TransferHandler<S>,
    deposits: DepositHandler<S>,
    withdrawals: WithdrawHandler<S>,
    reconciliation: ReconciliationService<S>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            transfers: TransferHandler::new(store.clone(), config.clone()),
            deposits: DepositHandler::new(store.clone(), config.clone()),
            withdrawals: WithdrawHandler::new(store.clone(), config),
            reconciliation: ReconciliationService::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Move money between two wallets
    pub async fn transfer(
        &self,
        command: TransferCommand,
        context: &OperationContext,
        cancel: &Cancellation,
    ) -> LedgerResult<TransferOutcome> {
        self.transfers.execute(command, context, cancel).await
    }

    /// Credit a wallet from outside the ledger
    pub async fn deposit(
        &self,
        command: DepositCommand,
        context: &OperationContext,
        cancel: &Cancellation,
    ) -> LedgerResult<TransferOutcome> {
        self.deposits.execute(command, context, cancel).await
    }

    /// Debit a wallet for money leaving the ledger
    pub async fn withdraw(
        &self,
        command: WithdrawCommand,
        context: &OperationContext,
        cancel: &Cancellation,
    ) -> LedgerResult<TransferOutcome> {
        self.withdrawals.execute(command, context, cancel).await
    }

    /// Register a wallet with a zero balance
    pub async fn open_account(&self, account_id: Uuid) -> LedgerResult<()> {
        if !self.store.open(account_id).await? {
            return Err(LedgerError::AccountExists(account_id));
        }
        tracing::info!(%account_id, "Account opened");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn balance(&self, account_id: Uuid) -> LedgerResult<Money> {
        self.store
            .load(account_id)
            .await?
            .map(|account| account.balance())
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Records touching the account, newest first
    pub async fn history(
        &self,
        account_id: Uuid,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        if self.store.load(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        Ok(self.store.list_for_account(account_id, limit).await?)
    }

    pub async fn find_record(&self, id: Uuid) -> LedgerResult<Option<TransactionRecord>> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> LedgerResult<Option<TransactionRecord>> {
        let key = IdempotencyKey::new(key)?;
        Ok(self.store.find_by_idempotency_key(key.as_str()).await?)
    }

    /// Check the stored balance against the replayed transaction log
    pub async fn reconcile(&self, account_id: Uuid) -> LedgerResult<ReconciliationReport> {
        self.reconciliation.reconcile(account_id).await
    }
}
