//! Persistence layer.
//!
//! Accounts (credentials, commission settings, lifetime statistics) and the
//! append-only wager history. `SqliteStore` backs the CLI; `MemoryStore`
//! serves dry runs and tests.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Account, CommissionConfig, Credentials, StatsDelta, StoreError, WagerAttemptRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Stored credential sets keyed by unique account name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    async fn get(&self, account_name: &str) -> Result<Account, StoreError>;

    /// Fails with `DuplicateAccount` if the name is taken.
    async fn create(
        &self,
        account_name: &str,
        credentials: Credentials,
        commission: CommissionConfig,
    ) -> Result<Account, StoreError>;

    /// Removes the account together with its wager history.
    async fn delete(&self, account_name: &str) -> Result<(), StoreError>;

    /// Add `delta` to the lifetime statistics and set `last_used`.
    async fn increment_stats(
        &self,
        account_name: &str,
        delta: &StatsDelta,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Append-only log of wager attempts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: &WagerAttemptRecord) -> Result<(), StoreError>;

    /// Most recent first, at most `limit` records.
    async fn query(
        &self,
        account_name: Option<String>,
        limit: usize,
    ) -> Result<Vec<WagerAttemptRecord>, StoreError>;
}

/// Apply a delta to in-memory statistics; shared by both store backends.
pub(crate) fn apply_delta(stats: &mut crate::types::AccountStats, delta: &StatsDelta, at: DateTime<Utc>) {
    stats.coupons_played += delta.played;
    stats.coupons_won += delta.won;
    stats.total_staked += delta.staked;
    stats.total_won += delta.payout;
    stats.last_used = Some(at);
}
