//! Integration tests for the ledger over the in-memory store

use std::sync::Arc;

use digital_wallet::{
    AmountInput, Cancellation, DepositCommand, LedgerError, Money, OperationContext,
    TransactionKind, TransferCommand, TransferFailureReason, TransferOutcome, TransferState,
    WithdrawCommand,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

mod common;

fn ctx() -> OperationContext {
    OperationContext::new()
}

// =========================================================================
// Money
// =========================================================================

#[test]
fn test_money_arithmetic_properties() {
    let samples = [dec!(0), dec!(0.01), dec!(1), dec!(40), dec!(100.00), dec!(12345.6789)];

    for a in samples {
        for b in samples {
            let (ma, mb) = (Money::new(a).unwrap(), Money::new(b).unwrap());
            assert_eq!(ma.increase(&mb).unwrap().value(), a + b);

            if a >= b {
                assert_eq!(ma.decrease(&mb).unwrap().value(), a - b);
            } else {
                assert_err!(ma.decrease(&mb));
            }
        }
    }

    assert_err!(Money::new(dec!(-0.01)));
    assert_eq!(Money::new(dec!(1.0)).unwrap(), Money::new(dec!(1.00)).unwrap());
}

// =========================================================================
// Transfer
// =========================================================================

#[tokio::test]
async fn test_transfer_updates_both_balances() {
    let (_, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "100").await;
    let b = common::funded_account(&ledger, "15").await;

    let outcome = assert_ok!(
        ledger
            .transfer(TransferCommand::new(a, b, "40"), &ctx(), &Cancellation::new())
            .await
    );

    match outcome {
        TransferOutcome::Success {
            origin_balance,
            destination_balance,
            ..
        } => {
            assert_eq!(origin_balance, Some(Money::new(dec!(60)).unwrap()));
            assert_eq!(destination_balance, Some(Money::new(dec!(55)).unwrap()));
        }
        other => panic!("Expected success, got: {:?}", other),
    }

    assert_eq!(ledger.balance(a).await.unwrap().value(), dec!(60));
    assert_eq!(ledger.balance(b).await.unwrap().value(), dec!(55));
}

#[tokio::test]
async fn test_insufficient_balance_appends_one_failed_record() {
    let (store, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "30").await;
    let b = common::funded_account(&ledger, "0").await;
    let before = store.record_count().await;

    let outcome = ledger
        .transfer(TransferCommand::new(a, b, "40"), &ctx(), &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(
        outcome.failure_reason(),
        Some(TransferFailureReason::InsufficientBalance)
    );
    assert_eq!(store.record_count().await, before + 1);
    assert_eq!(ledger.balance(a).await.unwrap().value(), dec!(30));
    assert_eq!(ledger.balance(b).await.unwrap().value(), Decimal::ZERO);

    let history = ledger.history(a, Some(1)).await.unwrap();
    assert_eq!(history[0].state, TransferState::Failed);
    assert_eq!(
        history[0].failure_reason,
        Some(TransferFailureReason::InsufficientBalance)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_overdraw_only_one_succeeds() {
    let (_, ledger) = common::memory_ledger(common::test_config().with_max_commit_retries(8));
    let ledger = Arc::new(ledger);
    let a = common::funded_account(&ledger, "100").await;
    let b = common::funded_account(&ledger, "0").await;
    let c = common::funded_account(&ledger, "0").await;

    let first = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .transfer(TransferCommand::new(a, b, "70"), &ctx(), &Cancellation::new())
                .await
        })
    };
    let second = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .transfer(TransferCommand::new(a, c, "60"), &ctx(), &Cancellation::new())
                .await
        })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    let outcomes = [&first, &second];
    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| o.failure_reason() == Some(TransferFailureReason::InsufficientBalance))
            .count(),
        1
    );

    let expected = if first.is_success() { dec!(30) } else { dec!(40) };
    assert_eq!(ledger.balance(a).await.unwrap().value(), expected);
}

#[tokio::test]
async fn test_same_key_is_applied_once() {
    let (store, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "100").await;
    let b = common::funded_account(&ledger, "0").await;
    let key = common::unique_key("callback");

    let command = TransferCommand::new(a, b, "25").with_idempotency_key(key.clone());
    let first = ledger
        .transfer(command.clone(), &ctx(), &Cancellation::new())
        .await
        .unwrap();
    let records_after_first = store.record_count().await;
    let second = ledger
        .transfer(command, &ctx(), &Cancellation::new())
        .await
        .unwrap();

    assert!(second.is_replayed());
    assert_eq!(first.record(), second.record());
    assert_eq!(store.record_count().await, records_after_first);
    assert_eq!(ledger.balance(a).await.unwrap().value(), dec!(75));

    let stored = ledger.find_by_idempotency_key(&key).await.unwrap().unwrap();
    assert_eq!(Some(&stored), first.record());
}

#[tokio::test]
async fn test_same_key_different_amount_conflicts() {
    let (_, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "100").await;
    let b = common::funded_account(&ledger, "0").await;
    let key = common::unique_key("conflict");

    ledger
        .transfer(
            TransferCommand::new(a, b, "25").with_idempotency_key(key.clone()),
            &ctx(),
            &Cancellation::new(),
        )
        .await
        .unwrap();

    let err = ledger
        .transfer(
            TransferCommand::new(a, b, "26").with_idempotency_key(key),
            &ctx(),
            &Cancellation::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::IdempotencyConflict(_)));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn test_commit_fault_leaves_no_trace() {
    let (store, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "100").await;
    let b = common::funded_account(&ledger, "0").await;
    let before = store.record_count().await;

    store.fail_next_commits(1);
    let err = ledger
        .transfer(TransferCommand::new(a, b, "10"), &ctx(), &Cancellation::new())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(store.record_count().await, before);
    assert_eq!(ledger.balance(a).await.unwrap().value(), dec!(100));
    assert_eq!(ledger.balance(b).await.unwrap().value(), Decimal::ZERO);
}

#[tokio::test]
async fn test_cancelled_transfer_never_mutates() {
    let (store, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "100").await;
    let b = common::funded_account(&ledger, "0").await;
    let before = store.record_count().await;

    let cancel = Cancellation::new();
    cancel.cancel();

    let err = ledger
        .transfer(TransferCommand::new(a, b, "10"), &ctx(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Cancelled));
    assert_eq!(store.record_count().await, before);
    assert_eq!(ledger.balance(a).await.unwrap().value(), dec!(100));
}

// =========================================================================
// Deposit
// =========================================================================

#[tokio::test]
async fn test_non_positive_deposit_is_rejected() {
    let (_, ledger) = common::memory_ledger(common::test_config());
    let b = common::funded_account(&ledger, "5").await;

    for amount in [AmountInput::from("0"), AmountInput::from("-10"), AmountInput::minor(-1, 2)] {
        let outcome = ledger
            .deposit(DepositCommand::new(b, amount), &ctx(), &Cancellation::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.failure_reason(),
            Some(TransferFailureReason::InvalidAmount)
        );
    }

    assert_eq!(ledger.balance(b).await.unwrap().value(), dec!(5));
}

// =========================================================================
// Withdraw
// =========================================================================

#[tokio::test]
async fn test_withdraw_then_history() {
    let (store, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "60").await;

    let paid = assert_ok!(
        ledger
            .withdraw(WithdrawCommand::new(a, "45"), &ctx(), &Cancellation::new())
            .await
    );
    assert!(paid.is_success());

    let before = store.record_count().await;
    let short = ledger
        .withdraw(WithdrawCommand::new(a, "45"), &ctx(), &Cancellation::new())
        .await
        .unwrap();
    assert_eq!(
        short.failure_reason(),
        Some(TransferFailureReason::InsufficientBalance)
    );
    assert_eq!(store.record_count().await, before + 1);
    assert_eq!(ledger.balance(a).await.unwrap().value(), dec!(15));

    let history = ledger.history(a, None).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].state, TransferState::Failed);
    assert_eq!(history[1].kind, TransactionKind::Withdrawal);
    assert_eq!(history[1].destination_id, None);
    assert_eq!(history[1].balance_of(a), Some(Money::new(dec!(15)).unwrap()));
}

// =========================================================================
// Accounts, history and reconciliation
// =========================================================================

#[tokio::test]
async fn test_open_account_twice() {
    let (_, ledger) = common::memory_ledger(common::test_config());
    let id = Uuid::new_v4();

    assert_ok!(ledger.open_account(id).await);
    assert!(matches!(
        ledger.open_account(id).await,
        Err(LedgerError::AccountExists(existing)) if existing == id
    ));
    assert_eq!(ledger.balance(id).await.unwrap(), Money::ZERO);
}

#[tokio::test]
async fn test_unknown_account_queries() {
    let (_, ledger) = common::memory_ledger(common::test_config());
    let id = Uuid::new_v4();

    assert!(matches!(ledger.balance(id).await, Err(LedgerError::AccountNotFound(_))));
    assert!(matches!(ledger.history(id, None).await, Err(LedgerError::AccountNotFound(_))));
    assert!(matches!(ledger.reconcile(id).await, Err(LedgerError::AccountNotFound(_))));
    assert_eq!(ledger.find_record(Uuid::new_v4()).await.unwrap(), None);
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let (_, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "50").await;
    let b = common::funded_account(&ledger, "0").await;

    let outcome = ledger
        .transfer(
            TransferCommand::new(a, b, "20").with_description("Books"),
            &ctx(),
            &Cancellation::new(),
        )
        .await
        .unwrap();
    let transfer_id = outcome.record().unwrap().id;

    let history = ledger.history(a, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, transfer_id);
    assert_eq!(history[0].kind, TransactionKind::Transfer);
    assert_eq!(history[1].kind, TransactionKind::Deposit);

    let found = ledger.find_record(transfer_id).await.unwrap().unwrap();
    assert_eq!(found.description.as_deref(), Some("Books"));
    assert_eq!(found.balance_of(a), Some(Money::new(dec!(30)).unwrap()));
    assert_eq!(found.balance_of(b), Some(Money::new(dec!(20)).unwrap()));
}

#[tokio::test]
async fn test_reconcile_after_mixed_operations() {
    let (_, ledger) = common::memory_ledger(common::test_config());
    let a = common::funded_account(&ledger, "100").await;
    let b = common::funded_account(&ledger, "10").await;

    let commands = vec![
        TransferCommand::new(a, b, "35.50"),
        TransferCommand::new(b, a, "5.25"),
        TransferCommand::new(a, b, "1000"),
        TransferCommand::new(a, a, "1"),
        TransferCommand::new(b, a, "0"),
    ];
    for command in commands {
        ledger.transfer(command, &ctx(), &Cancellation::new()).await.unwrap();
    }
    ledger
        .deposit(DepositCommand::new(b, "2.75"), &ctx(), &Cancellation::new())
        .await
        .unwrap();
    for command in [WithdrawCommand::new(a, "9.75"), WithdrawCommand::new(b, "500")] {
        ledger.withdraw(command, &ctx(), &Cancellation::new()).await.unwrap();
    }

    for id in [a, b] {
        let report = ledger.reconcile(id).await.unwrap();
        assert!(report.consistent, "inconsistent: {:?}", report);
        assert_eq!(report.stored_balance, report.replayed_balance);
        assert!(report.mismatched_records.is_empty());
    }

    assert_eq!(ledger.balance(a).await.unwrap().value(), dec!(60.00));
    assert_eq!(ledger.balance(b).await.unwrap().value(), dec!(43.00));
}
