//! Accountant — statistics deltas and aggregate reporting.
//!
//! Turns recorded wager attempts into the per-account statistics update
//! that is persisted after a run, and builds the overall statistics view
//! over all accounts and their history.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::types::{Account, StatsDelta, WagerAttemptRecord};

/// Size of each ranking in [`StatisticsReport`].
const TOP_N: usize = 5;

// ---------------------------------------------------------------------------
// Statistics report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub account_name: String,
    pub coupons_played: u64,
    pub coupons_won: u64,
    pub success_rate: Decimal,
    pub total_staked: Decimal,
    pub total_won: Decimal,
    pub net_profit: Decimal,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            account_name: account.account_name.clone(),
            coupons_played: account.stats.coupons_played,
            coupons_won: account.stats.coupons_won,
            success_rate: account.stats.success_rate(),
            total_staked: account.stats.total_staked,
            total_won: account.stats.total_won,
            net_profit: account.stats.net_profit(),
        }
    }
}

/// Overall view: totals come from history, rankings from account stats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub total_accounts: usize,
    pub total_coupons: usize,
    pub successful_coupons: usize,
    /// Percent, one decimal.
    pub success_rate: Decimal,
    pub total_staked: Decimal,
    pub total_payout: Decimal,
    pub net_profit: Decimal,
    pub most_active: Vec<AccountSummary>,
    pub most_profitable: Vec<AccountSummary>,
}

impl fmt::Display for StatisticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accounts:        {}", self.total_accounts)?;
        writeln!(
            f,
            "Coupons:         {} ({} successful, {}%)",
            self.total_coupons, self.successful_coupons, self.success_rate
        )?;
        writeln!(f, "Total staked:    {} TL", self.total_staked)?;
        writeln!(f, "Total payout:    {} TL", self.total_payout)?;
        writeln!(f, "Net profit:      {} TL", self.net_profit)?;

        writeln!(f, "Most active:")?;
        for a in &self.most_active {
            writeln!(f, "  {:<20} {} played, {} won", a.account_name, a.coupons_played, a.coupons_won)?;
        }
        writeln!(f, "Most profitable:")?;
        for a in &self.most_profitable {
            writeln!(f, "  {:<20} won {} TL, net {} TL", a.account_name, a.total_won, a.net_profit)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Accountant
// ---------------------------------------------------------------------------

pub struct Accountant;

impl Accountant {
    /// Statistics update for one account's attempts.
    ///
    /// Every attempt counts as played; stake and payout are only booked for
    /// coupons the service accepted.
    pub fn delta(records: &[WagerAttemptRecord]) -> StatsDelta {
        records.iter().fold(StatsDelta::default(), |mut delta, record| {
            delta.played += 1;
            if record.succeeded {
                delta.won += 1;
                delta.staked += record.stake;
                delta.payout += record.payout;
            }
            delta
        })
    }

    pub fn statistics(accounts: &[Account], history: &[WagerAttemptRecord]) -> StatisticsReport {
        let accepted: Vec<_> = history.iter().filter(|r| r.succeeded).collect();
        let total_staked: Decimal = accepted.iter().map(|r| r.stake).sum();
        let total_payout: Decimal = accepted.iter().map(|r| r.payout).sum();

        let success_rate = if history.is_empty() {
            Decimal::ZERO
        } else {
            (Decimal::from(accepted.len()) * Decimal::ONE_HUNDRED / Decimal::from(history.len()))
                .round_dp(1)
        };

        let mut by_activity: Vec<&Account> = accounts.iter().collect();
        by_activity.sort_by(|a, b| b.stats.coupons_played.cmp(&a.stats.coupons_played));

        let mut by_winnings: Vec<&Account> = accounts.iter().collect();
        by_winnings.sort_by(|a, b| b.stats.total_won.cmp(&a.stats.total_won));

        let report = StatisticsReport {
            total_accounts: accounts.len(),
            total_coupons: history.len(),
            successful_coupons: accepted.len(),
            success_rate,
            total_staked,
            total_payout,
            net_profit: total_payout - total_staked,
            most_active: by_activity.into_iter().take(TOP_N).map(AccountSummary::from).collect(),
            most_profitable: by_winnings.into_iter().take(TOP_N).map(AccountSummary::from).collect(),
        };

        debug!(
            accounts = report.total_accounts,
            coupons = report.total_coupons,
            net_profit = %report.net_profit,
            "Statistics computed"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
