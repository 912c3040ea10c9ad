//! PostgreSQL ledger store
//!
//! Balances live in `account_balances` with a `version` column used for
//! compare-and-swap. Records live in the append-only `transaction_records`
//! table whose unique `idempotency_key` column resolves duplicate callbacks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::aggregate::AccountBalance;
use crate::domain::{Money, TransactionRecord, TransferFailureReason};

use super::{AppendStatus, BalanceMutation, BalanceStore, CommitStatus, StoreError, TransactionLog};

const RECORD_COLUMNS: &str = r#"
    id, kind, origin_id, destination_id, amount, state, failure_reason,
    description, origin_balance, destination_balance, idempotency_key,
    request_hash, correlation_id, request_user_id, created_at
"#;

type RecordRow = (
    Uuid,
    String,
    Option<Uuid>,
    Option<Uuid>,
    Decimal,
    String,
    Option<String>,
    Option<String>,
    Option<Decimal>,
    Option<Decimal>,
    Option<String>,
    String,
    Option<Uuid>,
    Option<Uuid>,
    DateTime<Utc>,
);

/// PostgreSQL implementation of the ledger store
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a record; `false` means the idempotency key is already taken
    async fn insert_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &TransactionRecord,
    ) -> Result<bool, StoreError> {
        let rows = sqlx::query(
            r#"
            INSERT INTO transaction_records (
                id, kind, origin_id, destination_id, amount, state, failure_reason,
                description, origin_balance, destination_balance, idempotency_key,
                request_hash, correlation_id, request_user_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.kind.to_string())
        .bind(record.origin_id)
        .bind(record.destination_id)
        .bind(record.amount.value())
        .bind(record.state.to_string())
        .bind(record.failure_reason.map(|r| r.as_str()))
        .bind(&record.description)
        .bind(record.origin_balance.map(|m| m.value()))
        .bind(record.destination_balance.map(|m| m.value()))
        .bind(&record.idempotency_key)
        .bind(&record.request_hash)
        .bind(record.correlation_id)
        .bind(record.request_user_id)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows == 1)
    }
}

fn money(value: Decimal, column: &str) -> Result<Money, StoreError> {
    Money::new(value).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn record_from_row(row: RecordRow) -> Result<TransactionRecord, StoreError> {
    let (
        id,
        kind,
        origin_id,
        destination_id,
        amount,
        state,
        failure_reason,
        description,
        origin_balance,
        destination_balance,
        idempotency_key,
        request_hash,
        correlation_id,
        request_user_id,
        created_at,
    ) = row;

    Ok(TransactionRecord {
        id,
        kind: kind.parse().map_err(StoreError::Corrupt)?,
        origin_id,
        destination_id,
        amount: money(amount, "amount")?,
        state: state.parse().map_err(StoreError::Corrupt)?,
        failure_reason: failure_reason
            .map(|r| r.parse::<TransferFailureReason>())
            .transpose()
            .map_err(StoreError::Corrupt)?,
        description,
        origin_balance: origin_balance
            .map(|v| money(v, "origin_balance"))
            .transpose()?,
        destination_balance: destination_balance
            .map(|v| money(v, "destination_balance"))
            .transpose()?,
        idempotency_key,
        request_hash,
        correlation_id,
        request_user_id,
        created_at,
    })
}

#[async_trait]
impl BalanceStore for PgLedgerStore {
    async fn open(&self, account_id: Uuid) -> Result<bool, StoreError> {
        let rows = sqlx::query(
            r#"
            INSERT INTO account_balances (account_id, balance, version)
            VALUES ($1, 0, 1)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows == 1)
    }

    async fn load(&self, account_id: Uuid) -> Result<Option<AccountBalance>, StoreError> {
        let row: Option<(Uuid, Decimal, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT account_id, balance, version, updated_at
            FROM account_balances
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, balance, version, updated_at)| -> Result<AccountBalance, StoreError> {
            Ok(AccountBalance::from_db_state(
                id,
                money(balance, "balance")?,
                version,
                updated_at,
            ))
        })
        .transpose()
    }

    async fn commit(&self, mutation: &BalanceMutation) -> Result<CommitStatus, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock rows in a stable order so opposing transfers cannot deadlock
        let mut updates: Vec<_> = mutation.updates.iter().collect();
        updates.sort_by_key(|u| u.account_id);

        for update in updates {
            let rows = sqlx::query(
                r#"
                UPDATE account_balances
                SET balance = $2, version = version + 1, updated_at = NOW()
                WHERE account_id = $1 AND version = $3
                "#,
            )
            .bind(update.account_id)
            .bind(update.new_balance.value())
            .bind(update.expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            // Zero rows is a lost race, not a fault
            if rows == 0 {
                tx.rollback().await?;
                return Ok(CommitStatus::VersionConflict {
                    account_id: update.account_id,
                    expected: update.expected_version,
                });
            }
        }

        if !self.insert_record(&mut tx, &mutation.record).await? {
            tx.rollback().await?;
            return Ok(CommitStatus::DuplicateIdempotencyKey(
                mutation.record.idempotency_key.clone().unwrap_or_default(),
            ));
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::CommitUncertain(e.to_string()))?;

        Ok(CommitStatus::Committed)
    }
}

#[async_trait]
impl TransactionLog for PgLedgerStore {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let query = format!("SELECT {RECORD_COLUMNS} FROM transaction_records WHERE idempotency_key = $1");
        let row: Option<RecordRow> = sqlx::query_as(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(record_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError> {
        let query = format!("SELECT {RECORD_COLUMNS} FROM transaction_records WHERE id = $1");
        let row: Option<RecordRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(record_from_row).transpose()
    }

    async fn append(&self, record: &TransactionRecord) -> Result<AppendStatus, StoreError> {
        let mut tx = self.pool.begin().await?;

        if !self.insert_record(&mut tx, record).await? {
            tx.rollback().await?;
            return Ok(AppendStatus::DuplicateIdempotencyKey(
                record.idempotency_key.clone().unwrap_or_default(),
            ));
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::CommitUncertain(e.to_string()))?;

        Ok(AppendStatus::Appended)
    }

    async fn list_for_account(
        &self,
        account_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        // LIMIT NULL means no limit
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM transaction_records \
             WHERE destination_id = $1 OR origin_id = $1 \
             ORDER BY seq DESC LIMIT $2"
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&query)
            .bind(account_id)
            .bind(limit.map(|l| l as i64))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}
