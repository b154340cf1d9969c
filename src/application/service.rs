use tracing::{debug, info, warn};

use crate::domain::{
    compute_summaries, BankAccount, DashboardSummary, FundTransfer, FundTransferId, Posting,
    PostingKind, Profile, Role, Session, Site, TransferEntry, TransferRequest,
};
use crate::storage::{CreateOutcome, DeleteOutcome, Repository};

use super::AppError;

/// Application service for the books: the dashboard aggregation and the fund-transfer ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
#[derive(Clone)]
pub struct LedgerService {
    repo: Repository,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Users
    // ========================

    pub async fn create_profile(&self, name: String, role: Role) -> Result<Profile, AppError> {
        if self.repo.get_profile_by_name(&name).await?.is_some() {
            return Err(AppError::AlreadyExists(name));
        }

        let profile = Profile::new(name, role);
        self.repo.save_profile(&profile).await?;
        info!(user = %profile.name, role = %profile.role, "created user");
        Ok(profile)
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, AppError> {
        Ok(self.repo.list_profiles().await?)
    }

    /// Resolve the acting user. No name means an anonymous session.
    pub async fn session_for(&self, user_name: Option<&str>) -> Result<Session, AppError> {
        match user_name {
            Some(name) => {
                let profile = self
                    .repo
                    .get_profile_by_name(name)
                    .await?
                    .ok_or_else(|| AppError::UserNotFound(name.to_string()))?;
                Ok(Session::for_user(profile))
            }
            None => Ok(Session::anonymous()),
        }
    }

    // ========================
    // Sites and bank accounts
    // ========================

    pub async fn create_site(&self, name: String) -> Result<Site, AppError> {
        if self.repo.get_site_by_name(&name).await?.is_some() {
            return Err(AppError::AlreadyExists(name));
        }

        let site = Site::new(name);
        self.repo.save_site(&site).await?;
        info!(site = %site.name, "created site");
        Ok(site)
    }

    pub async fn get_site(&self, name: &str) -> Result<Site, AppError> {
        self.repo
            .get_site_by_name(name)
            .await?
            .ok_or_else(|| AppError::SiteNotFound(name.to_string()))
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>, AppError> {
        Ok(self.repo.list_sites().await?)
    }

    pub async fn create_bank_account(
        &self,
        name: String,
        opening_balance_cents: i64,
    ) -> Result<BankAccount, AppError> {
        if self.repo.get_bank_account_by_name(&name).await?.is_some() {
            return Err(AppError::AlreadyExists(name));
        }

        let account = BankAccount::new(name).with_opening_balance(opening_balance_cents);
        self.repo.save_bank_account(&account).await?;
        info!(account = %account.name, balance = account.balance_cents, "created bank account");
        Ok(account)
    }

    pub async fn get_bank_account(&self, name: &str) -> Result<BankAccount, AppError> {
        self.repo
            .get_bank_account_by_name(name)
            .await?
            .ok_or_else(|| AppError::BankAccountNotFound(name.to_string()))
    }

    pub async fn list_bank_accounts(&self) -> Result<Vec<BankAccount>, AppError> {
        Ok(self.repo.list_bank_accounts().await?)
    }

    // ========================
    // Expenses and credits
    // ========================

    /// Record an expense or credit row. Balance effects of postings are not applied here.
    pub async fn record_posting(
        &self,
        kind: PostingKind,
        posting: Posting,
    ) -> Result<Posting, AppError> {
        if posting.amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        if posting.is_missing_account() {
            return Err(AppError::MissingBankAccount);
        }

        self.repo.save_posting(kind, &posting).await?;
        info!(%kind, amount = posting.amount_cents, method = %posting.method, "recorded posting");
        Ok(posting)
    }

    // ========================
    // Dashboard
    // ========================

    /// Fetch all four record sets and reduce them into the dashboard summaries.
    /// Any failed fetch aborts the whole aggregation.
    pub async fn dashboard(&self) -> Result<DashboardSummary, AppError> {
        let sites = self.repo.list_sites().await?;
        let expenses = self.repo.list_postings(PostingKind::Expense).await?;
        let credits = self.repo.list_postings(PostingKind::Credit).await?;
        let bank_accounts = self.repo.list_bank_accounts().await?;
        debug!(
            sites = sites.len(),
            expenses = expenses.len(),
            credits = credits.len(),
            bank_accounts = bank_accounts.len(),
            "fetched dashboard sources"
        );

        Ok(compute_summaries(
            &sites,
            &expenses,
            &credits,
            &bank_accounts,
        ))
    }

    // ========================
    // Fund transfers
    // ========================

    /// Record a fund transfer and move the money between the two accounts atomically.
    ///
    /// Same-account and non-positive amounts are rejected before any store access.
    /// A request carrying an idempotency key that was already used returns the
    /// existing transfer without touching balances again, provided it describes the
    /// same movement; otherwise it is an `IdempotencyConflict`.
    pub async fn create_transfer(
        &self,
        session: &Session,
        request: TransferRequest,
    ) -> Result<FundTransfer, AppError> {
        if let Err(rule) = request.validate() {
            warn!(error = %rule, "rejected fund transfer");
            return Err(rule.into());
        }
        let created_by = session.user_id().ok_or(AppError::NotAuthenticated)?;

        let mut transfer = FundTransfer::from_request(request, created_by);
        match self.repo.insert_transfer(&mut transfer).await? {
            CreateOutcome::Created(transfer) => {
                info!(
                    transfer = %transfer.id,
                    amount = transfer.amount_cents,
                    from = %transfer.from_account,
                    to = %transfer.to_account,
                    "recorded fund transfer"
                );
                Ok(transfer)
            }
            CreateOutcome::Replayed(existing) => {
                let key = existing.idempotency_key.clone().unwrap_or_default();
                if existing.same_movement(&transfer) {
                    info!(transfer = %existing.id, key = %key, "idempotency key replayed");
                    Ok(existing)
                } else {
                    warn!(
                        transfer = %existing.id,
                        key = %key,
                        "idempotency key reused for a different transfer"
                    );
                    Err(AppError::IdempotencyConflict(key))
                }
            }
            CreateOutcome::AccountMissing(account_id) => {
                Err(AppError::BankAccountNotFound(account_id.to_string()))
            }
        }
    }

    /// Delete a transfer, crediting the source and debiting the destination back.
    ///
    /// Authorization is left to the store; a refusal is reported as `PermissionDenied`.
    pub async fn delete_transfer(
        &self,
        session: &Session,
        id: FundTransferId,
    ) -> Result<FundTransfer, AppError> {
        match self.repo.delete_transfer(id, session.user_id()).await? {
            DeleteOutcome::Deleted(transfer) => {
                info!(
                    transfer = %transfer.id,
                    amount = transfer.amount_cents,
                    "deleted fund transfer and reversed balances"
                );
                Ok(transfer)
            }
            DeleteOutcome::NotFound => Err(AppError::TransferNotFound(id)),
            DeleteOutcome::Forbidden => {
                warn!(transfer = %id, "store refused transfer deletion");
                Err(AppError::PermissionDenied)
            }
            DeleteOutcome::ReversalFailed(account_id) => {
                warn!(transfer = %id, account = %account_id, "balance reversal failed");
                Err(AppError::ReversalFailed {
                    transfer_id: id,
                    account_id,
                })
            }
        }
    }

    /// All active transfers with their accounts' current name and balance.
    pub async fn list_transfers(&self) -> Result<Vec<TransferEntry>, AppError> {
        Ok(self.repo.list_transfer_entries().await?)
    }

    pub async fn get_transfer(&self, id: FundTransferId) -> Result<FundTransfer, AppError> {
        self.repo
            .get_transfer(id)
            .await?
            .ok_or(AppError::TransferNotFound(id))
    }
}
