//! Account Balance Aggregate
//!
//! AccountBalance is the only contended resource of the ledger. It is never
//! mutated in place by callers; `debit`/`credit` produce a `BalanceUpdate`
//! that a store applies with an optimistic version check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Money, MoneyError};

/// Current balance of one wallet account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account (wallet) ID
    id: Uuid,

    /// Current balance
    balance: Money,

    /// Optimistic lock version, bumped by every committed update
    version: i64,

    /// Last time the balance changed
    updated_at: DateTime<Utc>,
}

/// Compare-and-swap request for a single balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub account_id: Uuid,
    pub expected_version: i64,
    pub new_balance: Money,
}

impl AccountBalance {
    /// Open a new account with a zero balance at version 1
    pub fn open(id: Uuid) -> Self {
        Self {
            id,
            balance: Money::ZERO,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Rebuild an account from stored state
    pub fn from_db_state(id: Uuid, balance: Money, version: i64, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            balance,
            version,
            updated_at,
        }
    }

    // =========================================================================
    // Debit / credit
    // =========================================================================

    /// Debit (withdraw) money from the account
    /// Returns the update to be committed, or an error if funds are short
    pub fn debit(&self, amount: &Money) -> Result<BalanceUpdate, MoneyError> {
        let new_balance = self.balance.decrease(amount)?;
        Ok(self.update_to(new_balance))
    }

    /// Credit (deposit) money to the account
    pub fn credit(&self, amount: &Money) -> Result<BalanceUpdate, MoneyError> {
        let new_balance = self.balance.increase(amount)?;
        Ok(self.update_to(new_balance))
    }

    fn update_to(&self, new_balance: Money) -> BalanceUpdate {
        BalanceUpdate {
            account_id: self.id,
            expected_version: self.version,
            new_balance,
        }
    }

    /// Apply a committed update. Stores call this after the version check.
    pub fn apply(&self, update: &BalanceUpdate) -> Self {
        Self {
            id: self.id,
            balance: update.new_balance,
            version: self.version + 1,
            updated_at: Utc::now(),
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn funded(amount: rust_decimal::Decimal) -> AccountBalance {
        AccountBalance::from_db_state(Uuid::new_v4(), Money::new(amount).unwrap(), 3, Utc::now())
    }

    #[test]
    fn test_account_open() {
        let id = Uuid::new_v4();
        let account = AccountBalance::open(id);

        assert_eq!(account.id(), id);
        assert!(account.balance().is_zero());
        assert_eq!(account.version(), 1);
    }

    #[test]
    fn test_debit_produces_versioned_update() {
        let account = funded(dec!(100));
        let update = account.debit(&Money::new(dec!(40)).unwrap()).unwrap();

        assert_eq!(update.account_id, account.id());
        assert_eq!(update.expected_version, 3);
        assert_eq!(update.new_balance.value(), dec!(60));

        // The account itself is untouched until the update is applied
        assert_eq!(account.balance().value(), dec!(100));

        let applied = account.apply(&update);
        assert_eq!(applied.balance().value(), dec!(60));
        assert_eq!(applied.version(), 4);
    }

    #[test]
    fn test_credit() {
        let account = funded(dec!(5));
        let update = account.credit(&Money::new(dec!(0.5)).unwrap()).unwrap();
        assert_eq!(update.new_balance.value(), dec!(5.5));
    }

    #[test]
    fn test_account_insufficient_balance() {
        let account = funded(dec!(30));
        let result = account.debit(&Money::new(dec!(40)).unwrap());

        assert!(matches!(result, Err(MoneyError::InsufficientBalance { .. })));
    }
}
