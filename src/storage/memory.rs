//! In-memory account and history store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{apply_delta, AccountStore, HistoryStore};
use crate::types::{Account, CommissionConfig, Credentials, StatsDelta, StoreError, WagerAttemptRecord};

/// Volatile store; contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<BTreeMap<String, Account>>,
    history: RwLock<Vec<WagerAttemptRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing accounts (e.g. loaded from disk for a dry run).
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let map = accounts
            .into_iter()
            .map(|a| (a.account_name.clone(), a))
            .collect();
        Self {
            accounts: RwLock::new(map),
            history: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.accounts.read().await.values().cloned().collect())
    }

    async fn get(&self, account_name: &str) -> Result<Account, StoreError> {
        self.accounts
            .read()
            .await
            .get(account_name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(account_name.to_string()))
    }

    async fn create(
        &self,
        account_name: &str,
        credentials: Credentials,
        commission: CommissionConfig,
    ) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(account_name) {
            return Err(StoreError::DuplicateAccount(account_name.to_string()));
        }
        let mut account = Account::new(account_name, credentials);
        account.commission = commission;
        accounts.insert(account_name.to_string(), account.clone());
        Ok(account)
    }

    async fn delete(&self, account_name: &str) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.remove(account_name).is_none() {
            return Err(StoreError::NotFound(account_name.to_string()));
        }
        let mut history = self.history.write().await;
        let before = history.len();
        history.retain(|r| r.account_name != account_name);
        debug!(account = account_name, removed = before - history.len(), "Account deleted");
        Ok(())
    }

    async fn increment_stats(
        &self,
        account_name: &str,
        delta: &StatsDelta,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(account_name)
            .ok_or_else(|| StoreError::NotFound(account_name.to_string()))?;
        apply_delta(&mut account.stats, delta, at);
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, record: &WagerAttemptRecord) -> Result<(), StoreError> {
        self.history.write().await.push(record.clone());
        Ok(())
    }

    async fn query(
        &self,
        account_name: Option<String>,
        limit: usize,
    ) -> Result<Vec<WagerAttemptRecord>, StoreError> {
        let history = self.history.read().await;
        let mut records: Vec<_> = history
            .iter()
            .rev()
            .filter(|r| account_name.as_deref().map_or(true, |name| r.account_name == name))
            .cloned()
            .collect();
        // Stable: equal timestamps keep the later append first.
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }
}
