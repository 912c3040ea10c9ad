//! Steps shared by the transfer, deposit and withdrawal handlers

use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

use crate::aggregate::AccountBalance;
use crate::config::LedgerConfig;
use crate::domain::{Cancellation, Money, TransactionRecord};
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::IdempotencyKey;
use crate::store::{AppendStatus, BalanceStore, StoreError, TransactionLog};

use super::{AmountInput, TransferOutcome};

/// Apply the configured default deadline when the caller gave none
pub(crate) fn effective_cancellation(cancel: &Cancellation, config: &LedgerConfig) -> Cancellation {
    match (cancel.deadline(), config.operation_timeout) {
        (None, Some(timeout)) => cancel.clone().with_timeout(timeout),
        _ => cancel.clone(),
    }
}

/// Strictly positive amount, or `None` for zero, malformed or out-of-range input
pub(crate) fn positive_amount(input: &AmountInput) -> Option<Money> {
    input.to_money().ok().filter(Money::is_positive)
}

pub(crate) fn parse_key(raw: Option<&str>) -> LedgerResult<Option<IdempotencyKey>> {
    raw.map(IdempotencyKey::new).transpose()
}

/// Blank descriptions are dropped
pub(crate) fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Outcome of an earlier call with the same key, if any.
///
/// A stored record with a different fingerprint means the key was reused for
/// another request.
pub(crate) async fn replay<L: TransactionLog>(
    log: &L,
    key: &str,
    request_hash: &str,
) -> LedgerResult<Option<TransferOutcome>> {
    let Some(record) = log.find_by_idempotency_key(key).await? else {
        return Ok(None);
    };

    if record.request_hash != request_hash {
        tracing::warn!(idempotency_key = %key, transfer_id = %record.id, "Idempotency key reused with a different request");
        return Err(LedgerError::IdempotencyConflict(key.to_string()));
    }

    tracing::info!(idempotency_key = %key, transfer_id = %record.id, "Replaying stored outcome");
    TransferOutcome::from_record(record, true).map(Some)
}

/// Replay after the store reported the key as taken by a concurrent call
pub(crate) async fn replay_duplicate<L: TransactionLog>(
    log: &L,
    key: &str,
    request_hash: &str,
) -> LedgerResult<TransferOutcome> {
    replay(log, key, request_hash).await?.ok_or_else(|| {
        LedgerError::Store(StoreError::Corrupt(format!(
            "idempotency key {key} reported taken but no record found"
        )))
    })
}

/// Record a business failure that leaves every balance untouched
pub(crate) async fn record_failure<L: TransactionLog>(
    log: &L,
    record: TransactionRecord,
) -> LedgerResult<TransferOutcome> {
    let status = log.append(&record).await.map_err(|e| {
        tracing::error!(transfer_id = %record.id, error = %e, "Failed to append failure record");
        LedgerError::Store(e)
    })?;

    match status {
        AppendStatus::Appended => {
            tracing::info!(
                transfer_id = %record.id,
                origin_id = ?record.origin_id,
                destination_id = ?record.destination_id,
                reason = ?record.failure_reason,
                "Failed attempt recorded"
            );
            TransferOutcome::from_record(record, false)
        }
        AppendStatus::DuplicateIdempotencyKey(key) => {
            replay_duplicate(log, &key, &record.request_hash).await
        }
    }
}

/// Load one balance as a cancellable step
pub(crate) async fn load_account<B: BalanceStore>(
    store: &B,
    cancel: &Cancellation,
    account_id: Uuid,
) -> LedgerResult<Option<AccountBalance>> {
    cancel
        .guard(async { store.load(account_id).await.map_err(LedgerError::from) })
        .await
}

/// Wait before the next attempt: `attempt * base` plus up to half of `base` jitter
pub(crate) async fn backoff(config: &LedgerConfig, cancel: &Cancellation, attempt: u32) -> LedgerResult<()> {
    let base = config.retry_backoff;
    if base.is_zero() {
        return cancel.check();
    }

    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
    let delay = base * attempt + Duration::from_millis(jitter_ms);

    cancel
        .guard(async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
}
