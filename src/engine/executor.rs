//! Per-account wager pipeline.
//!
//! Submits a plan's combinations for one account strictly in order, one
//! request at a time, pausing between submissions. Every attempt is
//! recorded whatever its outcome; only a hard abort ends the pipeline early.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::progress::{ProgressSink, ProgressUpdate};
use crate::platforms::WageringClient;
use crate::types::{Account, AccountTask, PricedCombination, TaskStatus, WagerAttemptRecord};

/// Default pause between two submissions of the same account.
pub const DEFAULT_SUBMIT_DELAY: Duration = Duration::from_secs(3);

/// Default limit on each external call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Executor {
    client: Arc<dyn WageringClient>,
    submit_delay: Duration,
    call_timeout: Duration,
}

impl Executor {
    pub fn new(client: Arc<dyn WageringClient>, submit_delay: Duration, call_timeout: Duration) -> Self {
        Self {
            client,
            submit_delay,
            call_timeout,
        }
    }

    /// Run one account's pipeline to completion, hard abort, or cancellation.
    ///
    /// Cancellation is observed between submissions; a call already in
    /// flight finishes (or times out) and is recorded first.
    pub async fn execute(
        &self,
        account: Account,
        plan: Arc<[PricedCombination]>,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> AccountTask {
        let name = account.account_name.clone();
        let total = plan.len();
        let mut task = AccountTask::new(&name, total);
        task.transition(TaskStatus::Running);
        publish(progress.as_ref(), &task);

        info!(
            account = %name,
            combinations = total,
            client = self.client.name(),
            "Account pipeline started"
        );

        for (index, priced) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(account = %name, completed = index, "Pipeline cancelled");
                break;
            }

            let result = self
                .client
                .submit(&account.credentials, priced, self.call_timeout)
                .await;

            match result {
                Ok(outcome) => {
                    debug!(
                        account = %name,
                        combination = %priced.combination,
                        stake = %priced.stake.stake_amount,
                        succeeded = outcome.succeeded,
                        "Coupon submitted"
                    );
                    task.record(WagerAttemptRecord::new(&name, priced, outcome.succeeded, outcome.message));
                }
                Err(e) if e.is_hard_abort() => {
                    error!(account = %name, error = %e, "Hard abort, stopping account pipeline");
                    task.record(WagerAttemptRecord::new(&name, priced, false, e.to_string()));
                    task.fail(e.to_string());
                    publish(progress.as_ref(), &task);
                    return task;
                }
                Err(e) => {
                    warn!(
                        account = %name,
                        combination = %priced.combination,
                        error = %e,
                        "Coupon attempt failed"
                    );
                    task.record(WagerAttemptRecord::new(&name, priced, false, e.to_string()));
                }
            }
            publish(progress.as_ref(), &task);

            if index + 1 < total {
                tokio::select! {
                    _ = tokio::time::sleep(self.submit_delay) => {}
                    _ = cancel.cancelled() => {
                        info!(account = %name, completed = index + 1, "Pipeline cancelled");
                        break;
                    }
                }
            }
        }

        task.transition(TaskStatus::Completed);
        publish(progress.as_ref(), &task);

        let succeeded = task.results.iter().filter(|r| r.succeeded).count();
        info!(
            account = %name,
            attempts = task.results.len(),
            succeeded,
            "Account pipeline finished"
        );
        task
    }
}

fn publish(sink: &dyn ProgressSink, task: &AccountTask) {
    let (completed, total) = task.progress();
    sink.on_progress(ProgressUpdate {
        account_name: task.account_name.clone(),
        completed,
        total,
        status: task.status(),
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
