use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{AccountSnapshot, BankAccountId, Cents, UserId};

pub type FundTransferId = Uuid;

/// A balance delta to apply to one account.
pub type BalanceEffect = (BankAccountId, Cents);

/// What a user submits to move money between two bank accounts.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account: BankAccountId,
    pub to_account: BankAccountId,
    pub amount_cents: Cents,
    pub date: NaiveDate,
    pub description: Option<String>,
    /// Repeating a key returns the transfer already recorded under it.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferRuleError {
    #[error("source and destination accounts must be different")]
    SameAccount,
    #[error("transfer amount must be positive, got {0} cents")]
    NonPositiveAmount(Cents),
}

impl TransferRequest {
    pub fn new(
        from_account: BankAccountId,
        to_account: BankAccountId,
        amount_cents: Cents,
        date: NaiveDate,
    ) -> Self {
        Self {
            from_account,
            to_account,
            amount_cents,
            date,
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

    /// Checks that need no store access. Same-account is checked first.
    pub fn validate(&self) -> Result<(), TransferRuleError> {
        if self.from_account == self.to_account {
            return Err(TransferRuleError::SameAccount);
        }
        if self.amount_cents <= 0 {
            return Err(TransferRuleError::NonPositiveAmount(self.amount_cents));
        }
        Ok(())
    }
}

/// A ledger row recording money moved between two bank accounts.
/// Rows are never edited; deleting one reverses its balance effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundTransfer {
    pub id: FundTransferId,
    /// Creation order, assigned by the repository
    pub sequence: i64,
    pub from_account: BankAccountId,
    pub to_account: BankAccountId,
    /// Always positive
    pub amount_cents: Cents,
    /// Business date of the transfer
    pub date: NaiveDate,
    pub description: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl FundTransfer {
    /// Build the ledger row for a validated request.
    pub fn from_request(request: TransferRequest, created_by: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            from_account: request.from_account,
            to_account: request.to_account,
            amount_cents: request.amount_cents,
            date: request.date,
            description: request.description,
            created_by,
            created_at: Utc::now(),
            idempotency_key: request.idempotency_key,
        }
    }

    /// Deltas applied when the transfer is recorded: source down, destination up.
    pub fn balance_effects(&self) -> [BalanceEffect; 2] {
        [
            (self.from_account, -self.amount_cents),
            (self.to_account, self.amount_cents),
        ]
    }

    /// Whether `other` moves the same money: accounts, amount, date and description.
    pub fn same_movement(&self, other: &FundTransfer) -> bool {
        self.from_account == other.from_account
            && self.to_account == other.to_account
            && self.amount_cents == other.amount_cents
            && self.date == other.date
            && self.description == other.description
    }

    /// Exact inverse of [`FundTransfer::balance_effects`], applied on delete.
    pub fn reversal_effects(&self) -> [BalanceEffect; 2] {
        self.balance_effects()
            .map(|(account, delta)| (account, -delta))
    }
}

/// A transfer joined with the current state of both of its accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEntry {
    pub transfer: FundTransfer,
    pub from_account: AccountSnapshot,
    pub to_account: AccountSnapshot,
}
