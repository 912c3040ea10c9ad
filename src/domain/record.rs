//! Transaction Records
//!
//! Append-only audit entries for every transfer, deposit or withdrawal attempt.
//! A record is created once at the end of a protocol run and never changes.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Money;

/// What kind of balance mutation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    Deposit,
    Withdrawal,
}

/// Final state of a balance mutation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Success,
    Failed,
}

/// Reasons why a transfer or deposit might fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFailureReason {
    /// Amount is malformed, zero, negative or out of range
    InvalidAmount,

    /// Origin or destination account does not exist
    AccountNotFound,

    /// Origin doesn't have enough balance
    InsufficientBalance,

    /// Origin and destination are the same account
    SameAccount,
}

impl TransferFailureReason {
    /// Caller errors are rejected before anything is recorded.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, TransferFailureReason::InsufficientBalance)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Transfer => write!(f, "transfer"),
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(TransactionKind::Transfer),
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            other => Err(format!("unknown transaction kind: {other}")),
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Success => write!(f, "success"),
            TransferState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TransferState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TransferState::Success),
            "failed" => Ok(TransferState::Failed),
            other => Err(format!("unknown transfer state: {other}")),
        }
    }
}

impl TransferFailureReason {
    /// Stable storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferFailureReason::InvalidAmount => "invalid_amount",
            TransferFailureReason::AccountNotFound => "account_not_found",
            TransferFailureReason::InsufficientBalance => "insufficient_balance",
            TransferFailureReason::SameAccount => "same_account",
        }
    }
}

impl fmt::Display for TransferFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferFailureReason::InvalidAmount => write!(f, "Invalid amount"),
            TransferFailureReason::AccountNotFound => write!(f, "Account not found"),
            TransferFailureReason::InsufficientBalance => write!(f, "Insufficient balance"),
            TransferFailureReason::SameAccount => write!(f, "Cannot transfer to same account"),
        }
    }
}

impl FromStr for TransferFailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_amount" => Ok(TransferFailureReason::InvalidAmount),
            "account_not_found" => Ok(TransferFailureReason::AccountNotFound),
            "insufficient_balance" => Ok(TransferFailureReason::InsufficientBalance),
            "same_account" => Ok(TransferFailureReason::SameAccount),
            other => Err(format!("unknown failure reason: {other}")),
        }
    }
}

/// One completed or failed balance-mutation attempt.
///
/// Resulting balances are captured when the attempt finishes so history can be
/// displayed without re-deriving them. For failed attempts they hold the
/// unchanged balances observed at that time.
///
/// Timestamps carry microsecond precision, the resolution PostgreSQL stores,
/// so a record reads back exactly as it was returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub kind: TransactionKind,
    /// Absent for deposits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<Uuid>,
    /// Absent for withdrawals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<Uuid>,
    pub amount: Money,
    pub state: TransferState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<TransferFailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_balance: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_balance: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub request_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// User on whose behalf the attempt was made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn is_success(&self) -> bool {
        self.state == TransferState::Success
    }

    /// Check whether this record moved money in or out of the account.
    pub fn touches(&self, account_id: Uuid) -> bool {
        self.destination_id == Some(account_id) || self.origin_id == Some(account_id)
    }

    /// Balance of `account_id` captured when this record was written.
    pub fn balance_of(&self, account_id: Uuid) -> Option<Money> {
        if self.origin_id == Some(account_id) {
            self.origin_balance
        } else if self.destination_id == Some(account_id) {
            self.destination_balance
        } else {
            None
        }
    }
}

/// Everything known about an attempt before its outcome is decided.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub kind: TransactionKind,
    pub origin_id: Option<Uuid>,
    pub destination_id: Option<Uuid>,
    pub amount: Money,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
    pub request_hash: String,
    pub correlation_id: Option<Uuid>,
    pub request_user_id: Option<Uuid>,
}

impl PendingRecord {
    /// Finish as a successful mutation with the new balances
    pub fn succeeded(
        &self,
        origin_balance: Option<Money>,
        destination_balance: Option<Money>,
    ) -> TransactionRecord {
        self.finish(TransferState::Success, None, origin_balance, destination_balance)
    }

    /// Finish as a failed attempt with the balances left untouched
    pub fn failed(
        &self,
        reason: TransferFailureReason,
        origin_balance: Option<Money>,
        destination_balance: Option<Money>,
    ) -> TransactionRecord {
        self.finish(TransferState::Failed, Some(reason), origin_balance, destination_balance)
    }

    fn finish(
        &self,
        state: TransferState,
        failure_reason: Option<TransferFailureReason>,
        origin_balance: Option<Money>,
        destination_balance: Option<Money>,
    ) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            kind: self.kind,
            origin_id: self.origin_id,
            destination_id: self.destination_id,
            amount: self.amount,
            state,
            failure_reason,
            description: self.description.clone(),
            origin_balance,
            destination_balance,
            idempotency_key: self.idempotency_key.clone(),
            request_hash: self.request_hash.clone(),
            correlation_id: self.correlation_id,
            request_user_id: self.request_user_id,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}
