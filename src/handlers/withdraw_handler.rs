//! Withdraw Handler
//!
//! Debits a single wallet for money leaving the ledger. Only the origin
//! balance is compare-and-swapped; a short balance is recorded as a failed
//! attempt just like a transfer.

use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::domain::{
    Cancellation, MoneyError, OperationContext, PendingRecord, TransactionKind,
    TransferFailureReason,
};
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::request_fingerprint;
use crate::store::{BalanceMutation, CommitStatus, LedgerStore};

use super::protocol;
use super::{TransferOutcome, WithdrawCommand};

/// Handler for external debits
pub struct WithdrawHandler<S> {
    store: Arc<S>,
    config: LedgerConfig,
}

impl<S: LedgerStore> WithdrawHandler<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub async fn execute(
        &self,
        command: WithdrawCommand,
        context: &OperationContext,
        cancel: &Cancellation,
    ) -> LedgerResult<TransferOutcome> {
        let cancel = protocol::effective_cancellation(cancel, &self.config);
        let key = protocol::parse_key(command.idempotency_key.as_deref())?;

        let Some(amount) = protocol::positive_amount(&command.amount) else {
            tracing::debug!(amount = ?command.amount, "Rejected withdrawal amount");
            return Ok(TransferOutcome::rejected(TransferFailureReason::InvalidAmount));
        };

        let pending = PendingRecord {
            kind: TransactionKind::Withdrawal,
            origin_id: Some(command.origin_id),
            destination_id: None,
            amount,
            description: protocol::clean_description(command.description),
            idempotency_key: key.as_ref().map(|k| k.to_string()),
            request_hash: request_fingerprint(
                TransactionKind::Withdrawal,
                Some(command.origin_id),
                None,
                &amount,
            ),
            correlation_id: context.correlation_id,
            request_user_id: context.request_user_id,
        };

        if let Some(key) = &key {
            let prior = cancel
                .guard(protocol::replay(&*self.store, key.as_str(), &pending.request_hash))
                .await?;
            if let Some(outcome) = prior {
                return Ok(outcome);
            }
        }

        let max_attempts = self.config.max_commit_retries + 1;

        for attempt in 1..=max_attempts {
            let Some(origin) =
                protocol::load_account(&*self.store, &cancel, command.origin_id).await?
            else {
                return Ok(TransferOutcome::rejected(TransferFailureReason::AccountNotFound));
            };

            let debit = match origin.debit(&amount) {
                Ok(update) => update,
                Err(MoneyError::InsufficientBalance { .. }) => {
                    let record = pending.failed(
                        TransferFailureReason::InsufficientBalance,
                        Some(origin.balance()),
                        None,
                    );
                    cancel.check()?;
                    return protocol::record_failure(&*self.store, record).await;
                }
                Err(e) => return Err(LedgerError::Internal(e.to_string())),
            };

            let record = pending.succeeded(Some(debit.new_balance), None);
            let mutation = BalanceMutation {
                updates: vec![debit],
                record,
            };

            cancel.check()?;

            let status = self.store.commit(&mutation).await.map_err(|e| {
                tracing::error!(transfer_id = %mutation.record.id, error = %e, "Withdrawal commit failed");
                LedgerError::Store(e)
            })?;

            match status {
                CommitStatus::Committed => {
                    tracing::info!(
                        transfer_id = %mutation.record.id,
                        origin_id = %command.origin_id,
                        amount = %amount,
                        attempt,
                        "Withdrawal committed"
                    );
                    return TransferOutcome::from_record(mutation.record, false);
                }
                CommitStatus::VersionConflict { account_id, expected } => {
                    tracing::warn!(
                        %account_id,
                        expected,
                        "Concurrency conflict, retrying (attempt {}/{})",
                        attempt,
                        max_attempts
                    );
                    if attempt < max_attempts {
                        protocol::backoff(&self.config, &cancel, attempt).await?;
                    }
                }
                CommitStatus::DuplicateIdempotencyKey(key) => {
                    return protocol::replay_duplicate(&*self.store, &key, &pending.request_hash)
                        .await;
                }
            }
        }

        tracing::error!(
            origin_id = %command.origin_id,
            attempts = max_attempts,
            "Withdrawal gave up after repeated conflicts"
        );
        Err(LedgerError::RetriesExhausted {
            attempts: max_attempts,
        })
    }
}
