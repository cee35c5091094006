//! SQLite-backed account and history store.
//!
//! Money is stored as TEXT (exact `Decimal` round trip), timestamps as
//! RFC 3339 UTC TEXT, and the combination snapshot as JSON.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::{apply_delta, AccountStore, HistoryStore};
use crate::types::{
    Account, AccountStats, CommissionConfig, Credentials, StatsDelta, StoreError, WagerAttemptRecord,
};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Persistence(e.to_string())
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        info!("Connecting to database: {}", url);
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                account_name TEXT PRIMARY KEY,
                ssn TEXT NOT NULL,
                password TEXT NOT NULL,
                commission_enabled INTEGER NOT NULL DEFAULT 0,
                daily_commission TEXT NOT NULL DEFAULT '0',
                commission_notes TEXT,
                coupons_played INTEGER NOT NULL DEFAULT 0,
                coupons_won INTEGER NOT NULL DEFAULT 0,
                total_staked TEXT NOT NULL DEFAULT '0',
                total_won TEXT NOT NULL DEFAULT '0',
                last_used TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wager_history (
                id TEXT NOT NULL UNIQUE,
                account_name TEXT NOT NULL,
                combination TEXT NOT NULL, -- JSON snapshot
                stake TEXT NOT NULL,
                odds REAL NOT NULL,
                payout TEXT NOT NULL,
                profit TEXT NOT NULL,
                succeeded INTEGER NOT NULL,
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_account ON wager_history(account_name, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Schema ready");
        Ok(())
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Persistence(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_decimal(raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|e| StoreError::Persistence(format!("bad decimal {raw:?}: {e}")))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn account_from_row(row: &SqliteRow) -> Result<Account, StoreError> {
    let last_used: Option<String> = row.try_get("last_used")?;
    let created_at: String = row.try_get("created_at")?;
    let played: i64 = row.try_get("coupons_played")?;
    let won: i64 = row.try_get("coupons_won")?;
    let ssn: String = row.try_get("ssn")?;
    let password: String = row.try_get("password")?;

    Ok(Account {
        account_name: row.try_get("account_name")?,
        credentials: Arc::new(Credentials::new(ssn, password)),
        commission: CommissionConfig {
            enabled: row.try_get("commission_enabled")?,
            daily_commission: parse_decimal(row.try_get("daily_commission")?)?,
            notes: row.try_get("commission_notes")?,
        },
        stats: AccountStats {
            coupons_played: played.max(0) as u64,
            coupons_won: won.max(0) as u64,
            total_staked: parse_decimal(row.try_get("total_staked")?)?,
            total_won: parse_decimal(row.try_get("total_won")?)?,
            last_used: last_used.as_deref().map(parse_ts).transpose()?,
        },
        created_at: parse_ts(&created_at)?,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<WagerAttemptRecord, StoreError> {
    let combination: String = row.try_get("combination")?;
    let timestamp: String = row.try_get("timestamp")?;
    Ok(WagerAttemptRecord {
        id: row.try_get("id")?,
        account_name: row.try_get("account_name")?,
        combination: serde_json::from_str(&combination)
            .map_err(|e| StoreError::Persistence(format!("bad combination snapshot: {e}")))?,
        stake: parse_decimal(row.try_get("stake")?)?,
        odds: row.try_get("odds")?,
        payout: parse_decimal(row.try_get("payout")?)?,
        profit: parse_decimal(row.try_get("profit")?)?,
        succeeded: row.try_get("succeeded")?,
        message: row.try_get("message")?,
        timestamp: parse_ts(&timestamp)?,
    })
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY account_name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn get(&self, account_name: &str) -> Result<Account, StoreError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE account_name = ?")
            .bind(account_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(account_name.to_string()))?;
        account_from_row(&row)
    }

    async fn create(
        &self,
        account_name: &str,
        credentials: Credentials,
        commission: CommissionConfig,
    ) -> Result<Account, StoreError> {
        let mut account = Account::new(account_name, credentials);
        account.commission = commission;

        let result = sqlx::query(
            r#"
            INSERT INTO accounts (
                account_name, ssn, password, commission_enabled, daily_commission,
                commission_notes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.account_name)
        .bind(account.credentials.ssn.expose_secret().as_str())
        .bind(account.credentials.password.expose_secret().as_str())
        .bind(account.commission.enabled)
        .bind(account.commission.daily_commission.to_string())
        .bind(&account.commission.notes)
        .bind(ts(account.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(account = account_name, "Account created");
                Ok(account)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateAccount(account_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, account_name: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let history = sqlx::query("DELETE FROM wager_history WHERE account_name = ?")
            .bind(account_name)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM accounts WHERE account_name = ?")
            .bind(account_name)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(account_name.to_string()));
        }
        tx.commit().await?;

        info!(
            account = account_name,
            history_removed = history.rows_affected(),
            "Account deleted"
        );
        Ok(())
    }

    async fn increment_stats(
        &self,
        account_name: &str,
        delta: &StatsDelta,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Decimal sums happen in Rust; the transaction keeps read and write atomic.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM accounts WHERE account_name = ?")
            .bind(account_name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(account_name.to_string()))?;
        let mut stats = account_from_row(&row)?.stats;
        apply_delta(&mut stats, delta, at);

        sqlx::query(
            r#"
            UPDATE accounts
            SET coupons_played = ?, coupons_won = ?, total_staked = ?, total_won = ?, last_used = ?
            WHERE account_name = ?
            "#,
        )
        .bind(to_i64(stats.coupons_played))
        .bind(to_i64(stats.coupons_won))
        .bind(stats.total_staked.to_string())
        .bind(stats.total_won.to_string())
        .bind(ts(at))
        .bind(account_name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(account = account_name, played = delta.played, won = delta.won, "Stats updated");
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append(&self, record: &WagerAttemptRecord) -> Result<(), StoreError> {
        let combination = serde_json::to_string(&record.combination)
            .map_err(|e| StoreError::Persistence(format!("cannot encode combination: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO wager_history (
                id, account_name, combination, stake, odds, payout, profit,
                succeeded, message, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.account_name)
        .bind(combination)
        .bind(record.stake.to_string())
        .bind(record.odds)
        .bind(record.payout.to_string())
        .bind(record.profit.to_string())
        .bind(record.succeeded)
        .bind(&record.message)
        .bind(ts(record.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        account_name: Option<String>,
        limit: usize,
    ) -> Result<Vec<WagerAttemptRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match account_name {
            Some(name) => {
                sqlx::query(
                    "SELECT * FROM wager_history WHERE account_name = ? \
                     ORDER BY timestamp DESC, rowid DESC LIMIT ?",
                )
                .bind(name)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM wager_history ORDER BY timestamp DESC, rowid DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(record_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
