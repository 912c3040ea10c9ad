//! Command definitions
//!
//! Commands carry caller input into the ledger; outcomes carry results back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Money, MoneyError, TransactionRecord, TransferFailureReason};
use crate::error::LedgerResult;
use crate::store::StoreError;

// =========================================================================
// Amount input
// =========================================================================

/// Amount as supplied by a caller: a decimal string or a fixed-point integer.
/// Binary floats are never accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Decimal(String),
    Minor { units: i64, scale: u32 },
}

impl AmountInput {
    /// `units` of `10^-scale`, e.g. `minor(1050, 2)` is `10.50`
    pub fn minor(units: i64, scale: u32) -> Self {
        Self::Minor { units, scale }
    }

    /// Parse into Money; zero is accepted here and rejected by the protocol
    pub fn to_money(&self) -> Result<Money, MoneyError> {
        match self {
            AmountInput::Decimal(raw) => raw.parse(),
            AmountInput::Minor { units, scale } => Money::from_minor_units(*units, *scale),
        }
    }
}

impl From<&str> for AmountInput {
    fn from(value: &str) -> Self {
        Self::Decimal(value.to_string())
    }
}

impl From<String> for AmountInput {
    fn from(value: String) -> Self {
        Self::Decimal(value)
    }
}

impl From<Money> for AmountInput {
    fn from(value: Money) -> Self {
        Self::Decimal(value.to_string())
    }
}

// =========================================================================
// TransferCommand
// =========================================================================

/// Command to move money between two wallets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub origin_id: Uuid,
    pub destination_id: Uuid,
    pub amount: AmountInput,
    pub description: Option<String>,
    /// Trace/reference id used to suppress duplicate application
    pub idempotency_key: Option<String>,
}

impl TransferCommand {
    pub fn new(origin_id: Uuid, destination_id: Uuid, amount: impl Into<AmountInput>) -> Self {
        Self {
            origin_id,
            destination_id,
            amount: amount.into(),
            description: None,
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

// =========================================================================
// DepositCommand
// =========================================================================

/// Command to credit a single wallet (e.g. a confirmed bank payment)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCommand {
    pub destination_id: Uuid,
    pub amount: AmountInput,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

impl DepositCommand {
    pub fn new(destination_id: Uuid, amount: impl Into<AmountInput>) -> Self {
        Self {
            destination_id,
            amount: amount.into(),
            description: None,
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

// =========================================================================
// WithdrawCommand
// =========================================================================

/// Command to debit a single wallet (e.g. a payout to a bank account)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawCommand {
    pub origin_id: Uuid,
    pub amount: AmountInput,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

impl WithdrawCommand {
    pub fn new(origin_id: Uuid, amount: impl Into<AmountInput>) -> Self {
        Self {
            origin_id,
            amount: amount.into(),
            description: None,
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

// =========================================================================
// TransferOutcome
// =========================================================================

/// Result of a transfer, deposit or withdrawal.
///
/// `replayed` is set when the outcome was read back from the log because the
/// idempotency key had already been used; nothing was applied in that call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        origin_balance: Option<Money>,
        #[serde(skip_serializing_if = "Option::is_none")]
        destination_balance: Option<Money>,
        record: TransactionRecord,
        replayed: bool,
    },
    Failed {
        reason: TransferFailureReason,
        /// Present only for recorded business failures
        #[serde(skip_serializing_if = "Option::is_none")]
        record: Option<TransactionRecord>,
        replayed: bool,
    },
}

impl TransferOutcome {
    /// Caller error, nothing recorded
    pub fn rejected(reason: TransferFailureReason) -> Self {
        Self::Failed {
            reason,
            record: None,
            replayed: false,
        }
    }

    /// Rebuild the outcome a record stands for
    pub fn from_record(record: TransactionRecord, replayed: bool) -> LedgerResult<Self> {
        if record.is_success() {
            return Ok(Self::Success {
                origin_balance: record.origin_balance,
                destination_balance: record.destination_balance,
                record,
                replayed,
            });
        }

        let reason = record.failure_reason.ok_or_else(|| {
            StoreError::Corrupt(format!("failed record {} has no failure reason", record.id))
        })?;

        Ok(Self::Failed {
            reason,
            record: Some(record),
            replayed,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_replayed(&self) -> bool {
        match self {
            Self::Success { replayed, .. } | Self::Failed { replayed, .. } => *replayed,
        }
    }

    pub fn failure_reason(&self) -> Option<TransferFailureReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failed { reason, .. } => Some(*reason),
        }
    }

    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            Self::Success { record, .. } => Some(record),
            Self::Failed { record, .. } => record.as_ref(),
        }
    }
}
