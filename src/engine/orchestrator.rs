//! Account orchestrator — runs one wager pipeline per account concurrently
//! and persists the outcome once every pipeline has finished.

use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::accountant::Accountant;
use crate::engine::executor::{Executor, DEFAULT_CALL_TIMEOUT, DEFAULT_SUBMIT_DELAY};
use crate::engine::progress::ProgressSink;
use crate::platforms::WageringClient;
use crate::storage::{AccountStore, HistoryStore};
use crate::types::{
    Account, AccountTask, CostAnalysisResult, OrchestrationError, PricedCombination, StoreError,
    TaskStatus, WagerAttemptRecord,
};

/// Default maximum age of the feed data behind a plan.
pub const DEFAULT_MAX_PLAN_AGE: Duration = Duration::from_secs(900);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub submit_delay: Duration,
    pub call_timeout: Duration,
    /// `None` disables the stale-plan check.
    pub max_plan_age: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            submit_delay: DEFAULT_SUBMIT_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_plan_age: Some(DEFAULT_MAX_PLAN_AGE),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one orchestration run.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationReport {
    /// Ordered attempts per account.
    pub results: BTreeMap<String, Vec<WagerAttemptRecord>>,
    pub statuses: BTreeMap<String, TaskStatus>,
    /// Hard-abort reasons of failed accounts.
    pub failures: BTreeMap<String, String>,
    /// Persistence problems that survived the retry.
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl OrchestrationReport {
    pub fn total_attempts(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn total_succeeded(&self) -> usize {
        self.results
            .values()
            .flat_map(|records| records.iter())
            .filter(|r| r.succeeded)
            .count()
    }

    pub fn summary(&self) -> String {
        let failed = self
            .statuses
            .values()
            .filter(|s| **s == TaskStatus::Failed)
            .count();
        format!(
            "{} accounts, {} attempts, {} succeeded, {} failed accounts, {} warnings{}",
            self.statuses.len(),
            self.total_attempts(),
            self.total_succeeded(),
            failed,
            self.warnings.len(),
            if self.cancelled { " (cancelled)" } else { "" },
        )
    }
}

impl fmt::Display for OrchestrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for (name, records) in &self.results {
            let status = self
                .statuses
                .get(name)
                .copied()
                .unwrap_or(TaskStatus::Idle)
                .to_string();
            let ok = records.iter().filter(|r| r.succeeded).count();
            writeln!(f, "  {name:<20} {status:<10} {ok}/{} succeeded", records.len())?;
            if let Some(reason) = self.failures.get(name) {
                writeln!(f, "    aborted: {reason}")?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "  WARNING: {warning}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct AccountOrchestrator {
    executor: Arc<Executor>,
    accounts: Arc<dyn AccountStore>,
    history: Arc<dyn HistoryStore>,
    config: OrchestratorConfig,
}

impl AccountOrchestrator {
    pub fn new(
        client: Arc<dyn WageringClient>,
        accounts: Arc<dyn AccountStore>,
        history: Arc<dyn HistoryStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = Arc::new(Executor::new(client, config.submit_delay, config.call_timeout));
        Self {
            executor,
            accounts,
            history,
            config,
        }
    }

    /// Execute `plan` for every account concurrently.
    ///
    /// Caller-input problems are rejected before anything is submitted.
    /// After every pipeline has finished, statistics and history are
    /// persisted; write failures are retried once and then reported as
    /// warnings without dropping any attempt from the report.
    pub async fn run(
        &self,
        accounts: Vec<Account>,
        plan: &CostAnalysisResult,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<OrchestrationReport, OrchestrationError> {
        self.check_input(&accounts, plan)?;

        let mut seen = HashSet::new();
        let accounts: Vec<Account> = accounts
            .into_iter()
            .filter(|a| seen.insert(a.account_name.clone()))
            .collect();
        let combinations: Arc<[PricedCombination]> = plan.combinations.clone().into();

        info!(
            accounts = accounts.len(),
            combinations = combinations.len(),
            total_cost = %plan.total_cost,
            "Starting orchestration"
        );

        let names: Vec<String> = accounts.iter().map(|a| a.account_name.clone()).collect();
        let handles: Vec<_> = accounts
            .into_iter()
            .map(|account| {
                let executor = self.executor.clone();
                let plan = combinations.clone();
                let progress = progress.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { executor.execute(account, plan, progress, cancel).await })
            })
            .collect();

        let mut tasks = Vec::with_capacity(names.len());
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    error!(account = %name, error = %e, "Account pipeline panicked");
                    let mut task = AccountTask::new(&name, combinations.len());
                    task.transition(TaskStatus::Running);
                    task.fail(format!("pipeline panicked: {e}"));
                    tasks.push(task);
                }
            }
        }
        let mut report = OrchestrationReport {
            cancelled: cancel.is_cancelled(),
            ..Default::default()
        };

        for task in &tasks {
            self.persist(task, &mut report.warnings).await;
        }

        for task in tasks {
            report.statuses.insert(task.account_name.clone(), task.status());
            if let Some(reason) = task.failure {
                report.failures.insert(task.account_name.clone(), reason);
            }
            report.results.insert(task.account_name, task.results);
        }

        info!(summary = %report.summary(), "Orchestration finished");
        Ok(report)
    }

    fn check_input(&self, accounts: &[Account], plan: &CostAnalysisResult) -> Result<(), OrchestrationError> {
        if accounts.is_empty() {
            return Err(OrchestrationError::NoAccountsSelected);
        }
        if plan.combinations.is_empty() {
            return Err(OrchestrationError::EmptyPlan);
        }
        if let Some(max_age) = self.config.max_plan_age {
            let now = Utc::now();
            if plan.is_stale(max_age, now) {
                let age_secs = plan
                    .fetched_at()
                    .map(|fetched| (now - fetched).num_seconds())
                    .unwrap_or_default();
                return Err(OrchestrationError::StalePlan {
                    age_secs,
                    max_age_secs: max_age.as_secs(),
                });
            }
        }
        Ok(())
    }

    /// Persist one account's statistics delta and attempt records.
    async fn persist(&self, task: &AccountTask, warnings: &mut Vec<String>) {
        if task.results.is_empty() {
            return;
        }
        let name = task.account_name.as_str();

        let delta = Accountant::delta(&task.results);
        let at = Utc::now();
        let (accounts, history, delta) = (&self.accounts, &self.history, &delta);

        let stats = retry_once(move || accounts.increment_stats(name, delta, at)).await;
        if let Err(e) = stats {
            error!(account = %name, error = %e, "Failed to update account statistics");
            warnings.push(format!("statistics for {name} not saved: {e}"));
        }

        for record in &task.results {
            if let Err(e) = retry_once(move || history.append(record)).await {
                error!(account = %name, record = %record.id, error = %e, "Failed to save wager record");
                warnings.push(format!("history record {} for {name} not saved: {e}", record.id));
            }
        }
    }
}

/// Run a store write, retrying once on failure.
async fn retry_once<F, Fut>(mut write: F) -> Result<(), StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    match write().await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(error = %e, "Store write failed, retrying once");
            write().await
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::NoopSink;
    use crate::platforms::dry_run::DryRunClient;
    use crate::storage::{MemoryStore, MockAccountStore, MockHistoryStore};
    use crate::strategy::analyze;
    use crate::types::{Credentials, Leg, OutcomeEntry};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    fn plan() -> CostAnalysisResult {
        let a = Leg::new(1, 1, "A", vec![OutcomeEntry::new(1, "X", 2.0), OutcomeEntry::new(2, "Y", 3.0)]);
        let b = Leg::new(2, 1, "B", vec![OutcomeEntry::new(1, "P", 1.5)]);
        analyze(&[a], &[b], dec!(100), true).unwrap()
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            submit_delay: Duration::from_millis(1),
            call_timeout: Duration::from_secs(1),
            max_plan_age: Some(DEFAULT_MAX_PLAN_AGE),
        }
    }

    fn accounts(names: &[&str]) -> Vec<Account> {
        names
            .iter()
            .map(|n| Account::new(*n, Credentials::new("12345678901", "pw")))
            .collect()
    }

    fn memory_orchestrator(store: Arc<MemoryStore>) -> AccountOrchestrator {
        AccountOrchestrator::new(Arc::new(DryRunClient::new()), store.clone(), store, fast_config())
    }

    #[tokio::test]
    async fn test_rejects_empty_accounts_and_plan() {
        let orchestrator = memory_orchestrator(Arc::new(MemoryStore::new()));
        let err = orchestrator
            .run(vec![], &plan(), Arc::new(NoopSink), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, OrchestrationError::NoAccountsSelected);

        let mut empty = plan();
        empty.combinations.clear();
        let err = orchestrator
            .run(accounts(&["a"]), &empty, Arc::new(NoopSink), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, OrchestrationError::EmptyPlan);
    }

    #[tokio::test]
    async fn test_rejects_stale_plan() {
        let orchestrator = memory_orchestrator(Arc::new(MemoryStore::new()));
        let mut stale = plan();
        stale.leg_a.fetched_at = Some(Utc::now() - chrono::Duration::hours(1));

        let err = orchestrator
            .run(accounts(&["a"]), &stale, Arc::new(NoopSink), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::StalePlan { max_age_secs: 900, .. }));

        stale.leg_a.fetched_at = Some(Utc::now());
        assert_ok!(
            orchestrator
                .run(accounts(&["a"]), &stale, Arc::new(NoopSink), CancellationToken::new())
                .await
        );
    }

    #[tokio::test]
    async fn test_run_persists_stats_and_history() {
        let store = Arc::new(MemoryStore::with_accounts(accounts(&["alice", "bob"])));
        let orchestrator = memory_orchestrator(store.clone());

        let report = orchestrator
            .run(accounts(&["alice", "bob", "alice"]), &plan(), Arc::new(NoopSink), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.total_attempts(), 4);
        assert_eq!(report.total_succeeded(), 4);
        assert!(report.warnings.is_empty());
        assert!(!report.cancelled);
        assert!(report.statuses.values().all(|s| *s == TaskStatus::Completed));

        let alice = store.get("alice").await.unwrap();
        assert_eq!(alice.stats.coupons_played, 2);
        assert_eq!(alice.stats.coupons_won, 2);
        assert_eq!(alice.stats.total_staked, dec!(57));
        assert_eq!(store.query(None, 100).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_persistence_retry_recovers_silently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut history = MockHistoryStore::new();
        history.expect_append().returning(move |_| {
            // Every first try fails, every retry succeeds.
            if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Err(StoreError::Persistence("database is locked".into()))
            } else {
                Ok(())
            }
        });
        let mut store = MockAccountStore::new();
        store.expect_increment_stats().times(1).returning(|_, _, _| Ok(()));

        let orchestrator = AccountOrchestrator::new(
            Arc::new(DryRunClient::new()),
            Arc::new(store),
            Arc::new(history),
            fast_config(),
        );
        let report = orchestrator
            .run(accounts(&["alice"]), &plan(), Arc::new(NoopSink), CancellationToken::new())
            .await
            .unwrap();

        assert!(report.warnings.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_persistence_double_failure_warns_once_per_write() {
        let mut history = MockHistoryStore::new();
        history
            .expect_append()
            .times(4)
            .returning(|_| Err(StoreError::Persistence("disk full".into())));
        let mut store = MockAccountStore::new();
        store
            .expect_increment_stats()
            .times(2)
            .returning(|_, _, _| Err(StoreError::Persistence("disk full".into())));

        let orchestrator = AccountOrchestrator::new(
            Arc::new(DryRunClient::new()),
            Arc::new(store),
            Arc::new(history),
            fast_config(),
        );
        let report = orchestrator
            .run(accounts(&["alice"]), &plan(), Arc::new(NoopSink), CancellationToken::new())
            .await
            .unwrap();

        // One stats write plus two history writes, each warned exactly once.
        assert_eq!(report.warnings.len(), 3);
        assert_eq!(report.total_attempts(), 2);
        assert_eq!(report.statuses["alice"], TaskStatus::Completed);
    }

    #[test]
    fn test_report_summary() {
        let mut report = OrchestrationReport::default();
        report.statuses.insert("alice".into(), TaskStatus::Completed);
        report.statuses.insert("bob".into(), TaskStatus::Failed);
        report.cancelled = true;
        let summary = report.summary();
        assert!(summary.contains("2 accounts"));
        assert!(summary.contains("1 failed accounts"));
        assert!(summary.ends_with("(cancelled)"));
    }
}
