use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type BankAccountId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: BankAccountId,
    pub name: String,
    /// Running total, adjusted by fund transfers rather than recomputed from history.
    pub balance_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            balance_cents: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_opening_balance(mut self, balance_cents: Cents) -> Self {
        self.balance_cents = balance_cents;
        self
    }
}

/// The account fields joined onto each listed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: BankAccountId,
    pub name: String,
    pub balance_cents: Cents,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_starts_at_zero() {
        let account = BankAccount::new("HDFC Current".into());
        assert_eq!(account.balance_cents, 0);
    }
}
