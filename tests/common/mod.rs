//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use digital_wallet::{
    Cancellation, DepositCommand, InMemoryLedgerStore, Ledger, LedgerConfig, LedgerStore,
    OperationContext, PgLedgerStore,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database and verify the schema.
///
/// Tests use fresh account ids and unique idempotency keys, so nothing is
/// truncated and tests can share the database concurrently.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    assert!(
        digital_wallet::db::check_schema(&pool)
            .await
            .expect("Failed to inspect schema"),
        "Run migrations/0001_wallet_ledger.sql before the PostgreSQL tests"
    );

    pool
}

/// Ledger settings without backoff delays
pub fn test_config() -> LedgerConfig {
    LedgerConfig::default().with_retry_backoff(Duration::ZERO)
}

/// In-memory ledger plus a handle on its store for fault injection
pub fn memory_ledger(config: LedgerConfig) -> (Arc<InMemoryLedgerStore>, Ledger<InMemoryLedgerStore>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let ledger = Ledger::new(store.clone(), config);
    (store, ledger)
}

pub async fn pg_ledger() -> Ledger<PgLedgerStore> {
    let pool = setup_test_db().await;
    Ledger::new(Arc::new(PgLedgerStore::new(pool)), test_config())
}

/// Open a wallet and fund it with `initial` (skipped for "0")
pub async fn funded_account<S: LedgerStore>(ledger: &Ledger<S>, initial: &str) -> Uuid {
    let id = Uuid::new_v4();
    ledger.open_account(id).await.expect("Failed to open account");

    if initial != "0" {
        let outcome = ledger
            .deposit(
                DepositCommand::new(id, initial),
                &OperationContext::new(),
                &Cancellation::new(),
            )
            .await
            .expect("Failed to fund account");
        assert!(outcome.is_success(), "funding deposit failed: {:?}", outcome);
    }

    id
}

/// Idempotency key unique across test runs
pub fn unique_key(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}
