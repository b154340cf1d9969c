use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{BankAccount, BankAccountId, Cents, PaymentMethod, Posting, Site, SiteId};

/// Name of the synthetic account row that collects every cash posting.
pub const CASH_ACCOUNT_NAME: &str = "Cash";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSummary {
    pub site_id: SiteId,
    pub site_name: String,
    pub received: Cents,
    pub expense: Cents,
    pub balance: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// `None` for the cash row
    pub account_id: Option<BankAccountId>,
    pub account_name: String,
    pub credit: Cents,
    pub expense: Cents,
}

impl AccountSummary {
    /// Display-only figure, not stored.
    pub fn balance(&self) -> Cents {
        self.credit - self.expense
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub incoming: Cents,
    pub expense: Cents,
    /// Recomputed from the two column totals, not summed from row balances.
    pub balance: Cents,
}

impl Totals {
    fn from_columns(incoming: Cents, expense: Cents) -> Self {
        Self {
            incoming,
            expense,
            balance: incoming - expense,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub sites: Vec<SiteSummary>,
    pub accounts: Vec<AccountSummary>,
}

impl DashboardSummary {
    pub fn site_totals(&self) -> Totals {
        Totals::from_columns(
            self.sites.iter().map(|s| s.received).sum(),
            self.sites.iter().map(|s| s.expense).sum(),
        )
    }

    pub fn account_totals(&self) -> Totals {
        Totals::from_columns(
            self.accounts.iter().map(|a| a.credit).sum(),
            self.accounts.iter().map(|a| a.expense).sum(),
        )
    }
}

/// Running sums for one table, bucketed the two ways the dashboard slices them.
#[derive(Default)]
struct Buckets {
    by_site: HashMap<SiteId, Cents>,
    by_bank_account: HashMap<BankAccountId, Cents>,
    cash: Cents,
}

impl Buckets {
    fn collect(postings: &[Posting]) -> Self {
        let mut buckets = Self::default();
        for posting in postings {
            if let Some(site_id) = posting.site_id {
                *buckets.by_site.entry(site_id).or_insert(0) += posting.amount_cents;
            }
            match (posting.method, posting.bank_account_id) {
                (PaymentMethod::Cash, _) => buckets.cash += posting.amount_cents,
                (PaymentMethod::BankTransfer, Some(account_id)) => {
                    *buckets.by_bank_account.entry(account_id).or_insert(0) +=
                        posting.amount_cents;
                }
                // Bank postings without an account belong to no account row.
                (PaymentMethod::BankTransfer, None) => {}
            }
        }
        buckets
    }

    fn site(&self, id: SiteId) -> Cents {
        self.by_site.get(&id).copied().unwrap_or(0)
    }

    fn bank_account(&self, id: BankAccountId) -> Cents {
        self.by_bank_account.get(&id).copied().unwrap_or(0)
    }
}

/// Reduce the four flat record sets into the site-wise and account-wise views.
///
/// One row is emitted per site (in input order), then a cash row followed by one row
/// per bank account (in input order), whether or not any posting matches.
pub fn compute_summaries(
    sites: &[Site],
    expenses: &[Posting],
    credits: &[Posting],
    bank_accounts: &[BankAccount],
) -> DashboardSummary {
    let expense_buckets = Buckets::collect(expenses);
    let credit_buckets = Buckets::collect(credits);

    let site_rows = sites
        .iter()
        .map(|site| {
            let received = credit_buckets.site(site.id);
            let expense = expense_buckets.site(site.id);
            SiteSummary {
                site_id: site.id,
                site_name: site.name.clone(),
                received,
                expense,
                balance: received - expense,
            }
        })
        .collect();

    let cash_row = AccountSummary {
        account_id: None,
        account_name: CASH_ACCOUNT_NAME.to_string(),
        credit: credit_buckets.cash,
        expense: expense_buckets.cash,
    };
    let account_rows = std::iter::once(cash_row)
        .chain(bank_accounts.iter().map(|account| AccountSummary {
            account_id: Some(account.id),
            account_name: account.name.clone(),
            credit: credit_buckets.bank_account(account.id),
            expense: expense_buckets.bank_account(account.id),
        }))
        .collect();

    DashboardSummary {
        sites: site_rows,
        accounts: account_rows,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn cash(amount: Cents) -> Posting {
        Posting::new(amount, PaymentMethod::Cash)
    }

    fn bank(amount: Cents, account: &BankAccount) -> Posting {
        Posting::new(amount, PaymentMethod::BankTransfer).with_bank_account(account.id)
    }

    #[test]
    fn test_empty_inputs_still_emit_rows() {
        let sites = vec![Site::new("Site1".into()), Site::new("Site2".into())];
        let accounts = vec![BankAccount::new("Bank-A".into())];

        let summary = compute_summaries(&sites, &[], &[], &accounts);

        assert_eq!(summary.sites.len(), 2);
        assert!(summary.sites.iter().all(|s| s.received == 0 && s.expense == 0));
        assert_eq!(summary.accounts.len(), 2);
        assert_eq!(summary.accounts[0].account_name, CASH_ACCOUNT_NAME);
        assert_eq!(summary.accounts[0].account_id, None);
        assert_eq!(summary.accounts[1].account_name, "Bank-A");
        assert_eq!(summary.account_totals(), Totals::from_columns(0, 0));
    }

    #[test]
    fn test_no_sites_no_accounts_leaves_only_cash_row() {
        let summary = compute_summaries(&[], &[cash(100)], &[cash(250)], &[]);

        assert!(summary.sites.is_empty());
        assert_eq!(summary.accounts.len(), 1);
        assert_eq!(summary.accounts[0].credit, 250);
        assert_eq!(summary.accounts[0].expense, 100);
        assert_eq!(summary.accounts[0].balance(), 150);
    }

    #[test]
    fn test_site_summary_scenario() {
        let site1 = Site::new("Site1".into());
        let site2 = Site::new("Site2".into());
        let credits = vec![
            cash(100000).with_site(site1.id),
            cash(50000).with_site(site1.id),
        ];
        let expenses = vec![cash(30000).with_site(site1.id)];

        let summary = compute_summaries(&[site1.clone(), site2.clone()], &expenses, &credits, &[]);

        assert_eq!(summary.sites[0].site_name, "Site1");
        assert_eq!(summary.sites[0].received, 150000);
        assert_eq!(summary.sites[0].expense, 30000);
        assert_eq!(summary.sites[0].balance, 120000);
        assert_eq!(summary.sites[1].site_id, site2.id);
        assert_eq!(
            (
                summary.sites[1].received,
                summary.sites[1].expense,
                summary.sites[1].balance
            ),
            (0, 0, 0)
        );
    }

    #[test]
    fn test_sites_keep_input_order() {
        let sites: Vec<Site> = ["Zeta", "Alpha", "Mid"]
            .iter()
            .map(|n| Site::new(n.to_string()))
            .collect();

        let summary = compute_summaries(&sites, &[], &[], &[]);
        let names: Vec<&str> = summary.sites.iter().map(|s| s.site_name.as_str()).collect();

        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_cash_row_ignores_bank_reference() {
        let bank_a = BankAccount::new("Bank-A".into());
        let stray = cash(700).with_bank_account(bank_a.id);

        let summary = compute_summaries(&[], &[stray], &[], &[bank_a]);

        assert_eq!(summary.accounts[0].expense, 700);
        assert_eq!(summary.accounts[1].expense, 0);
    }

    #[test]
    fn test_bank_rows_only_count_their_own_account() {
        let bank_a = BankAccount::new("Bank-A".into());
        let bank_b = BankAccount::new("Bank-B".into());
        let credits = vec![bank(1000, &bank_a), bank(2000, &bank_b), bank(300, &bank_a)];
        let expenses = vec![bank(400, &bank_b), cash(50)];

        let summary = compute_summaries(&[], &expenses, &credits, &[bank_a, bank_b]);

        assert_eq!(summary.accounts[1].credit, 1300);
        assert_eq!(summary.accounts[1].expense, 0);
        assert_eq!(summary.accounts[2].credit, 2000);
        assert_eq!(summary.accounts[2].expense, 400);
        assert_eq!(summary.accounts[2].balance(), 1600);
    }

    #[test]
    fn test_bank_posting_for_unknown_account_is_not_attributed() {
        let bank_a = BankAccount::new("Bank-A".into());
        let orphan = Posting::new(900, PaymentMethod::BankTransfer)
            .with_bank_account(Uuid::new_v4());
        let unassigned = Posting::new(100, PaymentMethod::BankTransfer);

        let summary = compute_summaries(&[], &[orphan, unassigned], &[], &[bank_a]);

        assert_eq!(summary.account_totals().expense, 0);
    }

    #[test]
    fn test_site_expense_total_matches_site_tagged_postings() {
        let sites: Vec<Site> = (0..3).map(|i| Site::new(format!("Site{}", i))).collect();
        let bank_a = BankAccount::new("Bank-A".into());
        let expenses = vec![
            cash(1).with_site(sites[0].id),
            cash(10).with_site(sites[1].id),
            bank(100, &bank_a).with_site(sites[2].id),
            bank(1000, &bank_a).with_site(sites[0].id),
            // not attributed to any site
            cash(10000),
        ];

        let summary = compute_summaries(&sites, &expenses, &[], &[bank_a]);
        let tagged: Cents = expenses
            .iter()
            .filter(|p| p.site_id.is_some())
            .map(|p| p.amount_cents)
            .sum();

        assert_eq!(summary.site_totals().expense, tagged);
        assert_eq!(summary.site_totals().expense, 1111);
    }

    #[test]
    fn test_account_rows_conserve_every_posting() {
        let bank_a = BankAccount::new("Bank-A".into());
        let bank_b = BankAccount::new("Bank-B".into());
        let credits = vec![cash(12345), bank(500, &bank_a), bank(1, &bank_b)];
        let expenses = vec![cash(99), bank(20, &bank_a), bank(7000, &bank_b), cash(3)];

        let summary = compute_summaries(&[], &expenses, &credits, &[bank_a, bank_b]);
        let totals = summary.account_totals();
        let all: Cents = credits
            .iter()
            .chain(expenses.iter())
            .map(|p| p.amount_cents)
            .sum();

        assert_eq!(totals.incoming + totals.expense, all);
        assert_eq!(totals.balance, totals.incoming - totals.expense);
    }

    #[test]
    fn test_many_small_amounts_do_not_drift() {
        let site = Site::new("Site1".into());
        let credits: Vec<Posting> = (0..10_000).map(|_| cash(10).with_site(site.id)).collect();

        let summary = compute_summaries(&[site], &[], &credits, &[]);

        // 10,000 x 0.10 is exactly 1,000.00
        assert_eq!(summary.sites[0].received, 100000);
    }
}
