//! End-to-end orchestration scenarios.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use pairplay::engine::{AccountOrchestrator, ChannelSink, NoopSink, OrchestratorConfig};
use pairplay::storage::{AccountStore, HistoryStore, MemoryStore};
use pairplay::strategy::analyze;
use pairplay::types::{Account, CostAnalysisResult, Credentials, Leg, OutcomeEntry, TaskStatus};

use crate::mock_client::{Script, ScriptedClient};

/// Two legs with two picks each: four combinations.
fn four_way_plan() -> CostAnalysisResult {
    let a = Leg::new(
        978,
        3,
        "3. Ayak",
        vec![OutcomeEntry::new(1, "Rüzgar", 2.0), OutcomeEntry::new(2, "Yıldız", 4.0)],
    );
    let b = Leg::new(
        978,
        8,
        "8. Ayak",
        vec![OutcomeEntry::new(1, "Kartal", 1.5), OutcomeEntry::new(5, "Poyraz", 3.0)],
    );
    analyze(&[a], &[b], dec!(100), true).unwrap()
}

fn single_plan() -> CostAnalysisResult {
    let a = Leg::new(978, 3, "3. Ayak", vec![OutcomeEntry::new(1, "Rüzgar", 2.0)]);
    let b = Leg::new(978, 8, "8. Ayak", vec![OutcomeEntry::new(1, "Kartal", 1.5)]);
    analyze(&[a], &[b], dec!(100), true).unwrap()
}

fn account(name: &str) -> Account {
    Account::new(name, Credentials::new("12345678901", "secret"))
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        submit_delay: Duration::from_secs(3),
        call_timeout: Duration::from_secs(10),
        max_plan_age: None,
    }
}

fn setup(script: Script, accounts: &[Account]) -> (Arc<ScriptedClient>, Arc<MemoryStore>, AccountOrchestrator) {
    let client = Arc::new(ScriptedClient::new(script));
    let store = Arc::new(MemoryStore::with_accounts(accounts.to_vec()));
    let orchestrator = AccountOrchestrator::new(client.clone(), store.clone(), store.clone(), config());
    (client, store, orchestrator)
}

#[tokio::test(start_paused = true)]
async fn test_refused_coupons_are_all_recorded() {
    let accounts = vec![account("alice"), account("bob"), account("cem")];
    let (client, store, orchestrator) = setup(Script::Refuse, &accounts);
    let plan = four_way_plan();

    let report = orchestrator
        .run(accounts, &plan, Arc::new(NoopSink), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total_attempts(), 12);
    assert_eq!(report.total_succeeded(), 0);
    assert!(report.statuses.values().all(|s| *s == TaskStatus::Completed));
    assert!(report.failures.is_empty());
    assert_eq!(client.plays().len(), 12);

    let alice = store.get("alice").await.unwrap();
    assert_eq!(alice.stats.coupons_played, 4);
    assert_eq!(alice.stats.coupons_won, 0);
    assert_eq!(alice.stats.total_staked, Decimal::ZERO);
    assert_eq!(store.query(None, 100).await.unwrap().len(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_coupon_does_not_stop_pipeline() {
    let accounts = vec![account("alice")];
    let (_client, _store, orchestrator) = setup(Script::Reject, &accounts);

    let report = orchestrator
        .run(accounts, &four_way_plan(), Arc::new(NoopSink), CancellationToken::new())
        .await
        .unwrap();

    let records = &report.results["alice"];
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| !r.succeeded && r.message.contains("rejected")));
    assert_eq!(report.statuses["alice"], TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_fail_attempts_not_accounts() {
    let accounts = vec![account("alice"), account("bob")];
    let (_client, _store, orchestrator) = setup(Script::Hang, &accounts);

    let report = orchestrator
        .run(accounts, &single_plan(), Arc::new(NoopSink), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total_attempts(), 2);
    assert_eq!(report.total_succeeded(), 0);
    for name in ["alice", "bob"] {
        assert_eq!(report.statuses[name], TaskStatus::Completed);
        assert!(report.results[name][0].message.contains("timed out"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_started_event_skips_play() {
    let accounts = vec![account("alice")];
    let (client, _store, orchestrator) = setup(Script::Started, &accounts);

    let report = orchestrator
        .run(accounts, &four_way_plan(), Arc::new(NoopSink), CancellationToken::new())
        .await
        .unwrap();

    assert!(client.plays().is_empty());
    let records = &report.results["alice"];
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.message == "event already started."));
}

#[tokio::test(start_paused = true)]
async fn test_hard_abort_is_isolated_to_one_account() {
    let broken = Account::new("broken", Credentials::new("", ""));
    let accounts = vec![account("alice"), broken];
    let (client, store, orchestrator) = setup(Script::Accept, &accounts);

    let report = orchestrator
        .run(accounts, &four_way_plan(), Arc::new(NoopSink), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.statuses["alice"], TaskStatus::Completed);
    assert_eq!(report.results["alice"].len(), 4);
    assert!(report.results["alice"].iter().all(|r| r.succeeded));

    assert_eq!(report.statuses["broken"], TaskStatus::Failed);
    assert_eq!(report.results["broken"].len(), 1);
    assert!(report.failures["broken"].contains("credentials"));

    // The broken account never reached the service.
    assert_eq!(client.logins(), 4);

    let broken = store.get("broken").await.unwrap();
    assert_eq!(broken.stats.coupons_played, 1);
    assert_eq!(broken.stats.coupons_won, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_delay_stops_before_next_submission() {
    let accounts = vec![account("alice"), account("bob")];
    let (client, store, orchestrator) = setup(Script::Accept, &accounts);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let report = orchestrator
        .run(accounts, &four_way_plan(), Arc::new(NoopSink), cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.total_attempts(), 2);
    assert_eq!(client.plays().len(), 2);
    assert!(report.statuses.values().all(|s| *s == TaskStatus::Completed));
    assert_eq!(store.get("alice").await.unwrap().stats.coupons_played, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_call_keeps_timed_out_attempt() {
    let accounts = vec![account("alice"), account("bob")];
    let (client, _store, orchestrator) = setup(Script::Hang, &accounts);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let report = orchestrator
        .run(accounts, &four_way_plan(), Arc::new(NoopSink), cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(client.plays().len(), 2);
    for name in ["alice", "bob"] {
        let records = &report.results[name];
        assert_eq!(records.len(), 1);
        assert!(!records[0].succeeded);
        assert!(records[0].message.contains("timed out"));
        assert_eq!(report.statuses[name], TaskStatus::Completed);
    }
}

#[tokio::test(start_paused = true)]
async fn test_submissions_follow_ascending_stake() {
    let accounts = vec![account("alice")];
    let (client, _store, orchestrator) = setup(Script::Accept, &accounts);
    let plan = four_way_plan();

    orchestrator
        .run(accounts, &plan, Arc::new(NoopSink), CancellationToken::new())
        .await
        .unwrap();

    let stakes: Vec<Decimal> = client.plays().iter().map(|p| p.stake).collect();
    let planned: Vec<Decimal> = plan.combinations.iter().map(|c| c.stake.stake_amount).collect();
    assert_eq!(stakes, planned);
    assert!(stakes.windows(2).all(|w| w[0] <= w[1]));

    // Leg A pick first, leg B pick second.
    let first = &client.plays()[0];
    assert_eq!(first.picks[0].sequence_no, 3);
    assert_eq!(first.picks[1].sequence_no, 8);
}

#[tokio::test(start_paused = true)]
async fn test_progress_reaches_total_for_every_account() {
    let accounts = vec![account("alice"), account("bob")];
    let (_client, _store, orchestrator) = setup(Script::Accept, &accounts);
    let (sink, mut rx) = ChannelSink::new();

    orchestrator
        .run(accounts, &four_way_plan(), Arc::new(sink), CancellationToken::new())
        .await
        .unwrap();

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }

    for name in ["alice", "bob"] {
        let mine: Vec<_> = updates.iter().filter(|u| u.account_name == name).collect();
        assert!(mine.windows(2).all(|w| w[0].completed <= w[1].completed));
        let last = mine.last().unwrap();
        assert_eq!(last.completed, 4);
        assert_eq!(last.total, 4);
        assert_eq!(last.status, TaskStatus::Completed);
    }
}
