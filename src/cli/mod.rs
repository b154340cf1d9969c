use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{AppError, LedgerService};
use crate::config::Config;
use crate::domain::{
    format_cents, parse_cents, DashboardSummary, PaymentMethod, Posting, PostingKind, Role,
    TransferRequest, TransferRuleError,
};

/// Sitebook - construction site books and bank fund transfers
#[derive(Parser)]
#[command(name = "sitebook")]
#[command(about = "Site-wise income/expense summaries and bank fund transfers")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides SITEBOOK_DATABASE)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Acting user name (overrides SITEBOOK_USER)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Site management commands
    #[command(subcommand)]
    Site(SiteCommands),

    /// Bank account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Record expenses
    #[command(subcommand)]
    Expense(PostingCommands),

    /// Record credits (money received)
    #[command(subcommand)]
    Credit(PostingCommands),

    /// Record a fund transfer between two bank accounts
    Transfer {
        /// Amount to transfer (e.g., "300.00" or "300")
        amount: String,

        /// Source bank account name
        #[arg(long)]
        from: String,

        /// Destination bank account name
        #[arg(long)]
        to: String,

        /// Description of the transfer
        #[arg(short = 'D', long)]
        description: Option<String>,

        /// Date of the transfer (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Key that makes resubmitting the same transfer safe
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// List fund transfers, most recent first
    Transfers,

    /// Delete a fund transfer and revert both account balances (admin only)
    #[command(name = "transfer-delete")]
    TransferDelete {
        /// Transfer ID
        id: String,
    },

    /// Show site-wise and account-wise summaries
    Dashboard {
        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: dashboard, transfers, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add a user
    Add {
        /// User name (must be unique)
        name: String,

        /// Role: admin, member
        #[arg(short, long, default_value = "member")]
        role: String,
    },

    /// List users
    List,
}

#[derive(Subcommand)]
pub enum SiteCommands {
    /// Add a site
    Add {
        /// Site name (must be unique)
        name: String,
    },

    /// List sites
    List,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Add a bank account
    Add {
        /// Account name (must be unique)
        name: String,

        /// Opening balance (e.g., "1000.00")
        #[arg(short, long)]
        balance: Option<String>,
    },

    /// List bank accounts with their balances
    List,
}

#[derive(Subcommand)]
pub enum PostingCommands {
    /// Add a posting
    Add {
        /// Amount (e.g., "1500.00")
        amount: String,

        /// Payment method: cash, bank_transfer
        #[arg(short, long, default_value = "cash")]
        method: String,

        /// Site name
        #[arg(short, long)]
        site: Option<String>,

        /// Bank account name (required for bank_transfer)
        #[arg(short, long)]
        account: Option<String>,

        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Description
        #[arg(short = 'D', long)]
        description: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::from_env()
            .context("Invalid SITEBOOK_* environment configuration")?
            .with_overrides(self.database, self.user);

        if matches!(self.command, Commands::Init) {
            LedgerService::init(&config.database).await?;
            println!("Database initialized: {}", config.database);
            return Ok(());
        }

        let service = LedgerService::connect(&config.database).await?;

        match self.command {
            Commands::Init => unreachable!("handled above"),

            Commands::User(cmd) => run_user_command(&service, cmd).await?,

            Commands::Site(cmd) => run_site_command(&service, cmd).await?,

            Commands::Account(cmd) => run_account_command(&service, cmd).await?,

            Commands::Expense(cmd) => {
                run_posting_command(&service, PostingKind::Expense, cmd).await?
            }

            Commands::Credit(cmd) => run_posting_command(&service, PostingKind::Credit, cmd).await?,

            Commands::Transfer {
                amount,
                from,
                to,
                description,
                date,
                idempotency_key,
            } => {
                // Same name means same account; reject before resolving anything.
                if from == to {
                    return Err(AppError::from(TransferRuleError::SameAccount).into());
                }

                let session = service.session_for(config.user.as_deref()).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '300.00' or '300'")?;
                let date = parse_optional_date(date)?;

                let from_account = service.get_bank_account(&from).await?;
                let to_account = service.get_bank_account(&to).await?;

                let mut request =
                    TransferRequest::new(from_account.id, to_account.id, amount_cents, date);
                if let Some(desc) = description {
                    request = request.with_description(desc);
                }
                if let Some(key) = idempotency_key {
                    request = request.with_idempotency_key(key);
                }

                let transfer = service.create_transfer(&session, request).await?;
                println!(
                    "Recorded transfer: {} {} -> {} ({})",
                    format_cents(transfer.amount_cents),
                    from_account.name,
                    to_account.name,
                    transfer.id
                );
                print_account_balances(&service, &[from_account.name, to_account.name]).await?;
            }

            Commands::Transfers => run_transfers_command(&service).await?,

            Commands::TransferDelete { id } => {
                let session = service.session_for(config.user.as_deref()).await?;
                if !session.can_delete_transfers() {
                    anyhow::bail!("Only administrators can delete fund transfers");
                }
                let transfer_id =
                    Uuid::parse_str(&id).context("Invalid transfer ID format (expected UUID)")?;

                let transfer = service.delete_transfer(&session, transfer_id).await?;
                println!(
                    "Deleted transfer {} and reverted {}",
                    transfer.id,
                    format_cents(transfer.amount_cents)
                );
                run_transfers_command(&service).await?;
            }

            Commands::Dashboard { format } => {
                let summary = service.dashboard().await?;
                match format.as_str() {
                    "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
                    "table" => print_dashboard(&summary),
                    other => anyhow::bail!("Unknown format '{}'. Use table or json", other),
                }
            }

            Commands::Export {
                export_type,
                output,
            } => run_export_command(&service, &export_type, output.as_deref()).await?,
        }

        Ok(())
    }
}

async fn run_user_command(service: &LedgerService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Add { name, role } => {
            let role = match role.to_lowercase().as_str() {
                "admin" => Role::Admin,
                "member" => Role::Member,
                other => anyhow::bail!("Invalid role '{}'. Valid roles: admin, member", other),
            };
            let profile = service.create_profile(name, role).await?;
            println!("Created user: {} ({})", profile.name, profile.role);
        }

        UserCommands::List => {
            let profiles = service.list_profiles().await?;
            if profiles.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<20} {:<8}", "NAME", "ROLE");
                println!("{}", "-".repeat(29));
                for profile in profiles {
                    println!("{:<20} {:<8}", profile.name, profile.role);
                }
            }
        }
    }
    Ok(())
}

async fn run_site_command(service: &LedgerService, cmd: SiteCommands) -> Result<()> {
    match cmd {
        SiteCommands::Add { name } => {
            let site = service.create_site(name).await?;
            println!("Created site: {}", site.name);
        }

        SiteCommands::List => {
            let sites = service.list_sites().await?;
            if sites.is_empty() {
                println!("No sites found.");
            }
            for site in sites {
                println!("{}", site.name);
            }
        }
    }
    Ok(())
}

async fn run_account_command(service: &LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Add { name, balance } => {
            let opening = balance
                .map(|b| parse_cents(&b))
                .transpose()
                .context("Invalid opening balance")?
                .unwrap_or(0);
            let account = service.create_bank_account(name, opening).await?;
            println!(
                "Created bank account: {} ({})",
                account.name,
                format_cents(account.balance_cents)
            );
        }

        AccountCommands::List => {
            let accounts = service.list_bank_accounts().await?;
            if accounts.is_empty() {
                println!("No bank accounts found.");
            } else {
                println!("{:<24} {:>14}", "ACCOUNT", "BALANCE");
                println!("{}", "-".repeat(39));
                for account in accounts {
                    println!(
                        "{:<24} {:>14}",
                        truncate(&account.name, 24),
                        format_cents(account.balance_cents)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_posting_command(
    service: &LedgerService,
    kind: PostingKind,
    cmd: PostingCommands,
) -> Result<()> {
    let PostingCommands::Add {
        amount,
        method,
        site,
        account,
        date,
        description,
    } = cmd;

    let amount_cents = parse_cents(&amount).context("Invalid amount format")?;
    let method: PaymentMethod = method.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let mut posting = Posting::new(amount_cents, method).with_date(parse_optional_date(date)?);
    if let Some(site_name) = site {
        posting = posting.with_site(service.get_site(&site_name).await?.id);
    }
    if let Some(account_name) = account {
        posting = posting.with_bank_account(service.get_bank_account(&account_name).await?.id);
    }
    if let Some(desc) = description {
        posting = posting.with_description(desc);
    }

    let posting = service.record_posting(kind, posting).await?;
    println!(
        "Recorded {}: {} ({})",
        kind,
        format_cents(posting.amount_cents),
        posting.method
    );
    Ok(())
}

async fn run_transfers_command(service: &LedgerService) -> Result<()> {
    let entries = service.list_transfers().await?;

    if entries.is_empty() {
        println!("No fund transfers found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<18} {:<18} {:>12} {:<36} DESCRIPTION",
        "DATE", "FROM", "TO", "AMOUNT", "ID"
    );
    println!("{}", "-".repeat(110));
    for entry in entries {
        let transfer = &entry.transfer;
        println!(
            "{:<12} {:<18} {:<18} {:>12} {:<36} {}",
            transfer.date.format("%Y-%m-%d"),
            truncate(&entry.from_account.name, 18),
            truncate(&entry.to_account.name, 18),
            format_cents(transfer.amount_cents),
            transfer.id,
            truncate(transfer.description.as_deref().unwrap_or(""), 30)
        );
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "dashboard" => {
            let count = exporter.export_dashboard_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} summary rows", count);
            }
        }
        "transfers" => {
            let count = exporter.export_transfers_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} fund transfers", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {} sites, {} accounts, {} fund transfers",
                    snapshot.dashboard.sites.len(),
                    snapshot.dashboard.accounts.len(),
                    snapshot.transfers.len()
                );
            }
        }
        other => anyhow::bail!(
            "Unknown export type '{}'. Use dashboard, transfers or full",
            other
        ),
    }
    Ok(())
}

/// Re-read the named accounts after a mutation so the printed balances are current.
async fn print_account_balances(service: &LedgerService, names: &[String]) -> Result<()> {
    for name in names {
        let account = service.get_bank_account(name).await?;
        println!(
            "  {:<24} {:>14}",
            account.name,
            format_cents(account.balance_cents)
        );
    }
    Ok(())
}

fn print_dashboard(summary: &DashboardSummary) {
    println!("Site-wise summary");
    println!(
        "{:<24} {:>14} {:>14} {:>14}",
        "SITE", "RECEIVED", "EXPENSE", "BALANCE"
    );
    println!("{}", "-".repeat(69));
    for site in &summary.sites {
        println!(
            "{:<24} {:>14} {:>14} {:>14}",
            truncate(&site.site_name, 24),
            format_cents(site.received),
            format_cents(site.expense),
            format_cents(site.balance)
        );
    }
    let totals = summary.site_totals();
    println!(
        "{:<24} {:>14} {:>14} {:>14}",
        "TOTAL",
        format_cents(totals.incoming),
        format_cents(totals.expense),
        format_cents(totals.balance)
    );

    println!();
    println!("Account-wise summary");
    println!(
        "{:<24} {:>14} {:>14} {:>14}",
        "ACCOUNT", "CREDIT", "EXPENSE", "BALANCE"
    );
    println!("{}", "-".repeat(69));
    for account in &summary.accounts {
        println!(
            "{:<24} {:>14} {:>14} {:>14}",
            truncate(&account.account_name, 24),
            format_cents(account.credit),
            format_cents(account.expense),
            format_cents(account.balance())
        );
    }
    let totals = summary.account_totals();
    println!(
        "{:<24} {:>14} {:>14} {:>14}",
        "TOTAL",
        format_cents(totals.incoming),
        format_cents(totals.expense),
        format_cents(totals.balance)
    );
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

fn parse_optional_date(date: Option<String>) -> Result<NaiveDate> {
    match date {
        Some(date_str) => NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str)),
        None => Ok(Utc::now().date_naive()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_names() {
        assert_eq!(truncate("Site1", 10), "Site1");
        assert_eq!(truncate("Greenfield Residency Phase 2", 12), "Greenfiel...");
    }

    #[test]
    fn test_parse_optional_date() {
        assert_eq!(
            parse_optional_date(Some("2025-03-01".into())).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
        assert!(parse_optional_date(Some("01/03/2025".into())).is_err());
        assert_eq!(parse_optional_date(None).unwrap(), Utc::now().date_naive());
    }

    #[test]
    fn test_cli_parses_transfer() {
        let cli = Cli::try_parse_from([
            "sitebook", "--user", "asha", "transfer", "300", "--from", "Bank-A", "--to", "Bank-B",
        ])
        .unwrap();

        assert_eq!(cli.user.as_deref(), Some("asha"));
        assert!(matches!(
            cli.command,
            Commands::Transfer { ref amount, ref from, ref to, .. }
                if amount == "300" && from == "Bank-A" && to == "Bank-B"
        ));
    }

    #[tokio::test]
    async fn test_same_account_transfer_fails_before_account_lookup() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("books.db");
        let db_path = db_path.to_str().unwrap();
        LedgerService::init(db_path).await.unwrap();

        // "Ghost" does not exist, so a lookup would report a missing account instead
        let cli = Cli::try_parse_from([
            "sitebook", "--database", db_path, "transfer", "300", "--from", "Ghost", "--to",
            "Ghost",
        ])
        .unwrap();
        let err = cli.run().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::InvalidTransfer(TransferRuleError::SameAccount))
        ));
    }
}
