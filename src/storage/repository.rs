use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    AccountSnapshot, BalanceEffect, BankAccount, BankAccountId, FundTransfer, FundTransferId,
    PaymentMethod, Posting, PostingKind, Profile, Role, Site, TransferEntry, UserId,
};

use super::MIGRATION_001_INITIAL;

const DATE_FORMAT: &str = "%Y-%m-%d";

const TRANSFER_COLUMNS: &str = "t.id, t.sequence, t.from_account_id, t.to_account_id, t.amount_cents, t.date, t.description, t.created_by, t.created_at, t.idempotency_key";

/// Result of recording a transfer together with its balance effects.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(FundTransfer),
    /// The idempotency key was already used; this is the transfer recorded under it.
    Replayed(FundTransfer),
    /// A referenced account does not exist; nothing was written.
    AccountMissing(BankAccountId),
}

/// Result of deleting a transfer together with its balance reversal.
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted(FundTransfer),
    NotFound,
    /// The acting user is not allowed to delete transfers; nothing was written.
    Forbidden,
    /// An account could not be credited back; the transfer row was kept.
    ReversalFailed(BankAccountId),
}

/// Repository for the books: sites, bank accounts, postings, profiles and fund transfers.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Profiles
    // ========================

    pub async fn save_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query("INSERT INTO profiles (id, name, role, created_at) VALUES (?, ?, ?, ?)")
            .bind(profile.id.to_string())
            .bind(&profile.name)
            .bind(profile.role.as_str())
            .bind(profile.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to save profile")?;
        Ok(())
    }

    pub async fn get_profile_by_name(&self, name: &str) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT id, name, role, created_at FROM profiles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch profile by name")?;

        row.as_ref().map(Self::row_to_profile).transpose()
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let rows = sqlx::query("SELECT id, name, role, created_at FROM profiles ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list profiles")?;

        rows.iter().map(Self::row_to_profile).collect()
    }

    fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<Profile> {
        let id_str: String = row.get("id");
        let role_str: String = row.get("role");
        let created_at_str: String = row.get("created_at");

        Ok(Profile {
            id: Uuid::parse_str(&id_str).context("Invalid profile ID")?,
            name: row.get("name"),
            role: Role::from_str_lossy(&role_str),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Sites
    // ========================

    pub async fn save_site(&self, site: &Site) -> Result<()> {
        sqlx::query("INSERT INTO sites (id, name, created_at) VALUES (?, ?, ?)")
            .bind(site.id.to_string())
            .bind(&site.name)
            .bind(site.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to save site")?;
        Ok(())
    }

    pub async fn get_site_by_name(&self, name: &str) -> Result<Option<Site>> {
        let row = sqlx::query("SELECT id, name, created_at FROM sites WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch site by name")?;

        row.as_ref().map(Self::row_to_site).transpose()
    }

    /// List sites in insertion order.
    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM sites ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list sites")?;

        rows.iter().map(Self::row_to_site).collect()
    }

    fn row_to_site(row: &sqlx::sqlite::SqliteRow) -> Result<Site> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Site {
            id: Uuid::parse_str(&id_str).context("Invalid site ID")?,
            name: row.get("name"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Bank accounts
    // ========================

    pub async fn save_bank_account(&self, account: &BankAccount) -> Result<()> {
        sqlx::query(
            "INSERT INTO bank_accounts (id, name, balance_cents, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(account.balance_cents)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save bank account")?;
        Ok(())
    }

    pub async fn get_bank_account_by_name(&self, name: &str) -> Result<Option<BankAccount>> {
        let row = sqlx::query(
            "SELECT id, name, balance_cents, created_at FROM bank_accounts WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch bank account by name")?;

        row.as_ref().map(Self::row_to_bank_account).transpose()
    }

    /// List bank accounts ordered by name.
    pub async fn list_bank_accounts(&self) -> Result<Vec<BankAccount>> {
        let rows = sqlx::query(
            "SELECT id, name, balance_cents, created_at FROM bank_accounts ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list bank accounts")?;

        rows.iter().map(Self::row_to_bank_account).collect()
    }

    fn row_to_bank_account(row: &sqlx::sqlite::SqliteRow) -> Result<BankAccount> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(BankAccount {
            id: Uuid::parse_str(&id_str).context("Invalid bank account ID")?,
            name: row.get("name"),
            balance_cents: row.get("balance_cents"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Expenses and credits
    // ========================

    pub async fn save_posting(&self, kind: PostingKind, posting: &Posting) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (id, site_id, amount_cents, payment_method, bank_account_id, date, description) VALUES (?, ?, ?, ?, ?, ?, ?)",
            kind.table()
        );

        sqlx::query(&query)
            .bind(posting.id.to_string())
            .bind(posting.site_id.map(|id| id.to_string()))
            .bind(posting.amount_cents)
            .bind(posting.method.as_str())
            .bind(posting.bank_account_id.map(|id| id.to_string()))
            .bind(posting.date.format(DATE_FORMAT).to_string())
            .bind(&posting.description)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to save {}", kind))?;
        Ok(())
    }

    /// Full scan of one posting table.
    pub async fn list_postings(&self, kind: PostingKind) -> Result<Vec<Posting>> {
        let query = format!(
            "SELECT id, site_id, amount_cents, payment_method, bank_account_id, date, description FROM {} ORDER BY date, rowid",
            kind.table()
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list {}", kind.table()))?;

        rows.iter().map(Self::row_to_posting).collect()
    }

    fn row_to_posting(row: &sqlx::sqlite::SqliteRow) -> Result<Posting> {
        let id_str: String = row.get("id");
        let site_str: Option<String> = row.get("site_id");
        let method_str: String = row.get("payment_method");
        let account_str: Option<String> = row.get("bank_account_id");
        let date_str: String = row.get("date");

        Ok(Posting {
            id: Uuid::parse_str(&id_str).context("Invalid posting ID")?,
            site_id: parse_optional_id(site_str).context("Invalid site reference")?,
            amount_cents: row.get("amount_cents"),
            method: method_str
                .parse::<PaymentMethod>()
                .map_err(|e| anyhow::anyhow!(e))?,
            bank_account_id: parse_optional_id(account_str)
                .context("Invalid bank account reference")?,
            date: parse_date(&date_str)?,
            description: row.get("description"),
        })
    }

    // ========================
    // Fund transfers
    // ========================

    /// Insert a transfer row and apply its balance effects in one transaction.
    /// Assigns the next sequence number on success. A transfer whose idempotency key is
    /// already recorded writes nothing and gets the stored row back.
    pub async fn insert_transfer(&self, transfer: &mut FundTransfer) -> Result<CreateOutcome> {
        let mut tx = self.begin_write().await?;

        if let Some(key) = transfer.idempotency_key.as_deref() {
            if let Some(existing) = Self::find_by_idempotency_key(&mut tx, key).await? {
                tx.rollback().await.context("Failed to roll back replay")?;
                return Ok(CreateOutcome::Replayed(existing));
            }
        }

        if let Some(missing) = Self::apply_effects(&mut tx, &transfer.balance_effects()).await? {
            tx.rollback().await.context("Failed to roll back transfer")?;
            return Ok(CreateOutcome::AccountMissing(missing));
        }

        transfer.sequence = Self::next_sequence(&mut tx).await?;

        sqlx::query(
            r#"
            INSERT INTO fund_transfers (id, sequence, from_account_id, to_account_id, amount_cents, date, description, created_by, created_at, idempotency_key)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transfer.id.to_string())
        .bind(transfer.sequence)
        .bind(transfer.from_account.to_string())
        .bind(transfer.to_account.to_string())
        .bind(transfer.amount_cents)
        .bind(transfer.date.format(DATE_FORMAT).to_string())
        .bind(&transfer.description)
        .bind(transfer.created_by.to_string())
        .bind(transfer.created_at.to_rfc3339())
        .bind(&transfer.idempotency_key)
        .execute(&mut *tx)
        .await
        .context("Failed to save fund transfer")?;

        tx.commit().await.context("Failed to commit fund transfer")?;
        Ok(CreateOutcome::Created(transfer.clone()))
    }

    /// Reverse a transfer's balance effects and remove its row in one transaction.
    ///
    /// Only admins may delete; the check runs inside the same transaction.
    pub async fn delete_transfer(
        &self,
        id: FundTransferId,
        actor: Option<UserId>,
    ) -> Result<DeleteOutcome> {
        let mut tx = self.begin_write().await?;

        if !Self::is_admin(&mut tx, actor).await? {
            tx.rollback().await.context("Failed to roll back delete")?;
            return Ok(DeleteOutcome::Forbidden);
        }

        let query = format!("SELECT {} FROM fund_transfers t WHERE t.id = ?", TRANSFER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch fund transfer")?;

        let transfer = match row {
            Some(row) => Self::row_to_transfer(&row)?,
            None => {
                tx.rollback().await.context("Failed to roll back delete")?;
                return Ok(DeleteOutcome::NotFound);
            }
        };

        if let Some(account) = Self::apply_effects(&mut tx, &transfer.reversal_effects()).await? {
            tx.rollback().await.context("Failed to roll back reversal")?;
            return Ok(DeleteOutcome::ReversalFailed(account));
        }

        sqlx::query("DELETE FROM fund_transfers WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete fund transfer")?;

        tx.commit().await.context("Failed to commit transfer deletion")?;
        Ok(DeleteOutcome::Deleted(transfer))
    }

    /// Take the write lock when the transaction starts, so concurrent writers wait on
    /// the busy timeout rather than failing to upgrade a read snapshot mid-transaction.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context("Failed to begin write transaction")
    }

    /// Apply relative balance deltas. Returns the first account that no longer exists.
    async fn apply_effects(
        tx: &mut Transaction<'_, Sqlite>,
        effects: &[BalanceEffect],
    ) -> Result<Option<BankAccountId>> {
        for (account_id, delta) in effects {
            let result =
                sqlx::query("UPDATE bank_accounts SET balance_cents = balance_cents + ? WHERE id = ?")
                    .bind(*delta)
                    .bind(account_id.to_string())
                    .execute(&mut **tx)
                    .await
                    .context("Failed to update account balance")?;

            if result.rows_affected() != 1 {
                return Ok(Some(*account_id));
            }
        }
        Ok(None)
    }

    async fn is_admin(tx: &mut Transaction<'_, Sqlite>, actor: Option<UserId>) -> Result<bool> {
        let Some(actor) = actor else {
            return Ok(false);
        };

        let role: Option<String> = sqlx::query("SELECT role FROM profiles WHERE id = ?")
            .bind(actor.to_string())
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to look up actor role")?
            .map(|row| row.get("role"));

        Ok(role.is_some_and(|r| Role::from_str_lossy(&r) == Role::Admin))
    }

    async fn next_sequence(tx: &mut Transaction<'_, Sqlite>) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transfer_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut **tx)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    pub async fn get_transfer(&self, id: FundTransferId) -> Result<Option<FundTransfer>> {
        let query = format!("SELECT {} FROM fund_transfers t WHERE t.id = ?", TRANSFER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch fund transfer")?;

        row.as_ref().map(Self::row_to_transfer).transpose()
    }

    async fn find_by_idempotency_key(
        tx: &mut Transaction<'_, Sqlite>,
        key: &str,
    ) -> Result<Option<FundTransfer>> {
        let query = format!(
            "SELECT {} FROM fund_transfers t WHERE t.idempotency_key = ?",
            TRANSFER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to fetch fund transfer by idempotency key")?;

        row.as_ref().map(Self::row_to_transfer).transpose()
    }

    /// All transfers joined with both accounts, newest date first, then newest created.
    pub async fn list_transfer_entries(&self) -> Result<Vec<TransferEntry>> {
        let query = format!(
            r#"
            SELECT {},
                fa.name AS from_name, fa.balance_cents AS from_balance,
                ta.name AS to_name, ta.balance_cents AS to_balance
            FROM fund_transfers t
            JOIN bank_accounts fa ON fa.id = t.from_account_id
            JOIN bank_accounts ta ON ta.id = t.to_account_id
            ORDER BY t.date DESC, t.sequence DESC
            "#,
            TRANSFER_COLUMNS
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list fund transfers")?;

        rows.iter()
            .map(|row| -> Result<TransferEntry> {
                let transfer = Self::row_to_transfer(row)?;
                Ok(TransferEntry {
                    from_account: AccountSnapshot {
                        id: transfer.from_account,
                        name: row.get("from_name"),
                        balance_cents: row.get("from_balance"),
                    },
                    to_account: AccountSnapshot {
                        id: transfer.to_account,
                        name: row.get("to_name"),
                        balance_cents: row.get("to_balance"),
                    },
                    transfer,
                })
            })
            .collect()
    }

    fn row_to_transfer(row: &sqlx::sqlite::SqliteRow) -> Result<FundTransfer> {
        let id_str: String = row.get("id");
        let from_str: String = row.get("from_account_id");
        let to_str: String = row.get("to_account_id");
        let date_str: String = row.get("date");
        let created_by_str: String = row.get("created_by");
        let created_at_str: String = row.get("created_at");

        Ok(FundTransfer {
            id: Uuid::parse_str(&id_str).context("Invalid transfer ID")?,
            sequence: row.get("sequence"),
            from_account: Uuid::parse_str(&from_str).context("Invalid from_account ID")?,
            to_account: Uuid::parse_str(&to_str).context("Invalid to_account ID")?,
            amount_cents: row.get("amount_cents"),
            date: parse_date(&date_str)?,
            description: row.get("description"),
            created_by: Uuid::parse_str(&created_by_str).context("Invalid created_by ID")?,
            created_at: parse_timestamp(&created_at_str)?,
            idempotency_key: row.get("idempotency_key"),
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("Invalid timestamp")?
        .with_timezone(&Utc))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("Invalid date: {}", s))
}

fn parse_optional_id(s: Option<String>) -> Result<Option<Uuid>> {
    s.map(|s| Uuid::parse_str(&s)).transpose().map_err(Into::into)
}
