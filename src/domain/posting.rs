use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BankAccountId, Cents, SiteId};

pub type PostingId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" | "bank-transfer" | "bank" => Ok(PaymentMethod::BankTransfer),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which table a posting lives in. Expenses are outgoing, credits incoming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingKind {
    Expense,
    Credit,
}

impl PostingKind {
    pub fn table(&self) -> &'static str {
        match self {
            PostingKind::Expense => "expenses",
            PostingKind::Credit => "credits",
        }
    }
}

impl std::fmt::Display for PostingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostingKind::Expense => write!(f, "expense"),
            PostingKind::Credit => write!(f, "credit"),
        }
    }
}

/// An expense or credit row. Both tables share this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    /// Cash postings may belong to no site.
    pub site_id: Option<SiteId>,
    pub amount_cents: Cents,
    pub method: PaymentMethod,
    /// Only meaningful for `BankTransfer`; ignored when aggregating cash.
    pub bank_account_id: Option<BankAccountId>,
    pub date: NaiveDate,
    pub description: Option<String>,
}

impl Posting {
    pub fn new(amount_cents: Cents, method: PaymentMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id: None,
            amount_cents,
            method,
            bank_account_id: None,
            date: Utc::now().date_naive(),
            description: None,
        }
    }

    pub fn with_site(mut self, site_id: SiteId) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn with_bank_account(mut self, bank_account_id: BankAccountId) -> Self {
        self.bank_account_id = Some(bank_account_id);
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A bank-transfer posting must name the account it went through.
    pub fn is_missing_account(&self) -> bool {
        self.method == PaymentMethod::BankTransfer && self.bank_account_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("cash".parse::<PaymentMethod>(), Ok(PaymentMethod::Cash));
        assert_eq!(
            "bank_transfer".parse::<PaymentMethod>(),
            Ok(PaymentMethod::BankTransfer)
        );
        assert_eq!(
            "Bank-Transfer".parse::<PaymentMethod>(),
            Ok(PaymentMethod::BankTransfer)
        );
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_bank_transfer_requires_account() {
        let bank_account = Uuid::new_v4();

        assert!(Posting::new(500, PaymentMethod::BankTransfer).is_missing_account());
        assert!(
            !Posting::new(500, PaymentMethod::BankTransfer)
                .with_bank_account(bank_account)
                .is_missing_account()
        );
        assert!(!Posting::new(500, PaymentMethod::Cash).is_missing_account());
    }
}
