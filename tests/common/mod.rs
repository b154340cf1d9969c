// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::str::FromStr;

use anyhow::Result;
use chrono::NaiveDate;
use sitebook::application::LedgerService;
use sitebook::domain::{BankAccount, Role, Session, TransferRequest};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use tempfile::TempDir;

/// A service over a throwaway database, plus the path for side-channel access.
pub struct TestBooks {
    pub service: LedgerService,
    pub db_path: String,
    _temp_dir: TempDir,
}

/// Helper to create a test service with a temporary database
pub async fn test_books() -> Result<TestBooks> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_str()
        .expect("temp path is valid UTF-8")
        .to_string();
    let service = LedgerService::init(&db_path).await?;
    Ok(TestBooks {
        service,
        db_path,
        _temp_dir: temp_dir,
    })
}

impl TestBooks {
    /// A second connection to the same file that bypasses foreign-key enforcement,
    /// for simulating damage the service itself would never cause.
    pub async fn raw_pool(&self) -> Result<SqlitePool> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", self.db_path))?.foreign_keys(false);
        Ok(SqlitePool::connect_with(options).await?)
    }

    pub async fn balance(&self, account: &str) -> Result<i64> {
        Ok(self.service.get_bank_account(account).await?.balance_cents)
    }
}

/// Helper to parse a date string into a NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Test fixture: two users and the two bank accounts used throughout the scenarios
pub struct StandardBooks {
    pub admin: Session,
    pub member: Session,
    pub bank_a: BankAccount,
    pub bank_b: BankAccount,
}

impl StandardBooks {
    /// Admin "asha", member "ravi", Bank-A at 1000.00 and Bank-B at 500.00
    pub async fn create(service: &LedgerService) -> Result<Self> {
        service.create_profile("asha".into(), Role::Admin).await?;
        service.create_profile("ravi".into(), Role::Member).await?;
        let bank_a = service.create_bank_account("Bank-A".into(), 100000).await?;
        let bank_b = service.create_bank_account("Bank-B".into(), 50000).await?;

        Ok(Self {
            admin: service.session_for(Some("asha")).await?,
            member: service.session_for(Some("ravi")).await?,
            bank_a,
            bank_b,
        })
    }

    /// A Bank-A -> Bank-B request for the given amount and date
    pub fn a_to_b(&self, amount_cents: i64, date: &str) -> TransferRequest {
        TransferRequest::new(self.bank_a.id, self.bank_b.id, amount_cents, parse_date(date))
    }
}
