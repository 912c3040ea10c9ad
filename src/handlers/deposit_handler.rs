//! Deposit Handler
//!
//! Credits a single wallet. There is no origin, so a deposit can only fail on
//! its input; nothing but a successful credit is ever recorded.

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
use super::{DepositCommand, TransferOutcome};

/// Handler for external credits
pub struct DepositHandler<S> {
    store: Arc<S>,
    config: LedgerConfig,
}

impl<S: LedgerStore> DepositHandler<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub async fn execute(
        &self,
        command: DepositCommand,
        context: &OperationContext,
        cancel: &Cancellation,
    ) -> LedgerResult<TransferOutcome> {
        let cancel = protocol::effective_cancellation(cancel, &self.config);
        let key = protocol::parse_key(command.idempotency_key.as_deref())?;

        let Some(amount) = protocol::positive_amount(&command.amount) else {
            return Ok(TransferOutcome::rejected(TransferFailureReason::InvalidAmount));
        };

        let pending = PendingRecord {
            kind: TransactionKind::Deposit,
            origin_id: None,
            destination_id: Some(command.destination_id),
            amount,
            description: protocol::clean_description(command.description),
            idempotency_key: key.as_ref().map(|k| k.to_string()),
            request_hash: request_fingerprint(
                TransactionKind::Deposit,
                None,
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
            let Some(destination) =
                protocol::load_account(&*self.store, &cancel, command.destination_id).await?
            else {
                return Ok(TransferOutcome::rejected(TransferFailureReason::AccountNotFound));
            };

            let credit = match destination.credit(&amount) {
                Ok(update) => update,
                Err(MoneyError::Overflow) => {
                    return Ok(TransferOutcome::rejected(TransferFailureReason::InvalidAmount));
                }
                Err(e) => return Err(LedgerError::Internal(e.to_string())),
            };

            let record = pending.succeeded(None, Some(credit.new_balance));
            let mutation = BalanceMutation {
                updates: vec![credit],
                record,
            };

            cancel.check()?;

            let status = self.store.commit(&mutation).await.map_err(|e| {
                tracing::error!(transfer_id = %mutation.record.id, error = %e, "Deposit commit failed");
                LedgerError::Store(e)
            })?;

            match status {
                CommitStatus::Committed => {
                    tracing::info!(
                        transfer_id = %mutation.record.id,
                        destination_id = %command.destination_id,
                        amount = %amount,
                        "Deposit committed"
                    );
                    return TransferOutcome::from_record(mutation.record, false);
                }
                CommitStatus::VersionConflict { account_id, .. } => {
                    tracing::warn!(
                        %account_id,
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
            destination_id = %command.destination_id,
            attempts = max_attempts,
            "Deposit gave up after repeated conflicts"
        );
        Err(LedgerError::RetriesExhausted {
            attempts: max_attempts,
        })
    }
}
