use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{format_cents, DashboardSummary, Totals, TransferEntry};

/// Dashboard and transfer ledger as exported to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooksSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub dashboard: DashboardSummary,
    pub site_totals: Totals,
    pub account_totals: Totals,
    pub transfers: Vec<TransferEntry>,
}

/// Exporter for converting the books to CSV or JSON
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export both dashboard tables as one CSV, each followed by its TOTAL row.
    /// Returns the number of data rows written (totals excluded).
    pub async fn export_dashboard_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let summary = self.service.dashboard().await?;
        write_dashboard_csv(&summary, writer)
    }

    /// Export the transfer ledger to CSV, most recent first.
    pub async fn export_transfers_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self.service.list_transfers().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "date",
            "from_account",
            "to_account",
            "amount",
            "description",
            "created_by",
            "created_at",
        ])?;

        for entry in &entries {
            let transfer = &entry.transfer;
            csv_writer.write_record([
                transfer.id.to_string(),
                transfer.date.to_string(),
                entry.from_account.name.clone(),
                entry.to_account.name.clone(),
                format_cents(transfer.amount_cents),
                transfer.description.clone().unwrap_or_default(),
                transfer.created_by.to_string(),
                transfer.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    /// Export dashboard and transfers as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<BooksSnapshot> {
        let dashboard = self.service.dashboard().await?;
        let transfers = self.service.list_transfers().await?;

        let snapshot = BooksSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            site_totals: dashboard.site_totals(),
            account_totals: dashboard.account_totals(),
            dashboard,
            transfers,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}

/// Write the summary as `section,name,incoming,expense,balance` rows.
pub fn write_dashboard_csv<W: Write>(summary: &DashboardSummary, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["section", "name", "incoming", "expense", "balance"])?;

    for site in &summary.sites {
        csv_writer.write_record([
            "site".to_string(),
            site.site_name.clone(),
            format_cents(site.received),
            format_cents(site.expense),
            format_cents(site.balance),
        ])?;
    }
    write_totals(&mut csv_writer, "site", summary.site_totals())?;

    for account in &summary.accounts {
        csv_writer.write_record([
            "account".to_string(),
            account.account_name.clone(),
            format_cents(account.credit),
            format_cents(account.expense),
            format_cents(account.balance()),
        ])?;
    }
    write_totals(&mut csv_writer, "account", summary.account_totals())?;

    csv_writer.flush()?;
    Ok(summary.sites.len() + summary.accounts.len())
}

fn write_totals<W: Write>(
    csv_writer: &mut csv::Writer<W>,
    section: &str,
    totals: Totals,
) -> Result<()> {
    csv_writer.write_record([
        section.to_string(),
        "TOTAL".to_string(),
        format_cents(totals.incoming),
        format_cents(totals.expense),
        format_cents(totals.balance),
    ])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{compute_summaries, BankAccount, PaymentMethod, Posting, Site};

    #[test]
    fn test_dashboard_csv_includes_totals() {
        let site = Site::new("Tower A".into());
        let bank = BankAccount::new("SBI".into());
        let credits = vec![
            Posting::new(150000, PaymentMethod::Cash).with_site(site.id),
            Posting::new(20000, PaymentMethod::BankTransfer).with_bank_account(bank.id),
        ];
        let expenses = vec![Posting::new(30000, PaymentMethod::Cash).with_site(site.id)];
        let summary = compute_summaries(&[site], &expenses, &credits, &[bank]);

        let mut buffer = Vec::new();
        let rows = write_dashboard_csv(&summary, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(rows, 3);
        assert_eq!(lines[0], "section,name,incoming,expense,balance");
        assert_eq!(lines[1], "site,Tower A,1500.00,300.00,1200.00");
        assert_eq!(lines[2], "site,TOTAL,1500.00,300.00,1200.00");
        assert_eq!(lines[3], "account,Cash,1500.00,300.00,1200.00");
        assert_eq!(lines[4], "account,SBI,200.00,0.00,200.00");
        assert_eq!(lines[5], "account,TOTAL,1700.00,300.00,1400.00");
    }
}
