//! Transfer Handler
//!
//! Moves money between two wallets. Both balances are compare-and-swapped
//! together with the record in one store commit; a lost race reloads and
//! retries up to the configured limit.

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
use super::{TransferCommand, TransferOutcome};

/// Handler for wallet-to-wallet transfers
pub struct TransferHandler<S> {
    store: Arc<S>,
    config: LedgerConfig,
}

impl<S: LedgerStore> TransferHandler<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Execute the transfer command
    pub async fn execute(
        &self,
        command: TransferCommand,
        context: &OperationContext,
        cancel: &Cancellation,
    ) -> LedgerResult<TransferOutcome> {
        let cancel = protocol::effective_cancellation(cancel, &self.config);
        let key = protocol::parse_key(command.idempotency_key.as_deref())?;

        let Some(amount) = protocol::positive_amount(&command.amount) else {
            tracing::debug!(amount = ?command.amount, "Rejected transfer amount");
            return Ok(TransferOutcome::rejected(TransferFailureReason::InvalidAmount));
        };

        if command.origin_id == command.destination_id {
            return Ok(TransferOutcome::rejected(TransferFailureReason::SameAccount));
        }

        let pending = PendingRecord {
            kind: TransactionKind::Transfer,
            origin_id: Some(command.origin_id),
            destination_id: Some(command.destination_id),
            amount,
            description: protocol::clean_description(command.description),
            idempotency_key: key.as_ref().map(|k| k.to_string()),
            request_hash: request_fingerprint(
                TransactionKind::Transfer,
                Some(command.origin_id),
                Some(command.destination_id),
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
            let origin =
                protocol::load_account(&*self.store, &cancel, command.origin_id).await?;
            let destination =
                protocol::load_account(&*self.store, &cancel, command.destination_id).await?;

            let (Some(origin), Some(destination)) = (origin, destination) else {
                return Ok(TransferOutcome::rejected(TransferFailureReason::AccountNotFound));
            };

            let debit = match origin.debit(&amount) {
                Ok(update) => update,
                Err(MoneyError::InsufficientBalance { .. }) => {
                    let record = pending.failed(
                        TransferFailureReason::InsufficientBalance,
                        Some(origin.balance()),
                        Some(destination.balance()),
                    );
                    cancel.check()?;
                    return protocol::record_failure(&*self.store, record).await;
                }
                Err(e) => return Err(LedgerError::Internal(e.to_string())),
            };

            let credit = match destination.credit(&amount) {
                Ok(update) => update,
                Err(MoneyError::Overflow) => {
                    return Ok(TransferOutcome::rejected(TransferFailureReason::InvalidAmount));
                }
                Err(e) => return Err(LedgerError::Internal(e.to_string())),
            };

            let record = pending.succeeded(Some(debit.new_balance), Some(credit.new_balance));
            let mutation = BalanceMutation {
                updates: vec![debit, credit],
                record,
            };

            // Last point at which the caller can still abort
            cancel.check()?;

            let status = self.store.commit(&mutation).await.map_err(|e| {
                tracing::error!(
                    transfer_id = %mutation.record.id,
                    error = %e,
                    "Transfer commit failed"
                );
                LedgerError::Store(e)
            })?;

            match status {
                CommitStatus::Committed => {
                    tracing::info!(
                        transfer_id = %mutation.record.id,
                        origin_id = %command.origin_id,
                        destination_id = %command.destination_id,
                        amount = %amount,
                        attempt,
                        "Transfer committed"
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
            destination_id = %command.destination_id,
            attempts = max_attempts,
            "Transfer gave up after repeated conflicts"
        );
        Err(LedgerError::RetriesExhausted {
            attempts: max_attempts,
        })
    }
}
