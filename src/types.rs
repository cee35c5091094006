//! Shared types for pairplay.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that strategy, platform,
//! storage and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Legs and outcomes
// ---------------------------------------------------------------------------

/// A single selectable pick within a leg (one runner in a race).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    pub pick_no: u32,
    pub pick_name: String,
    /// Decimal odds as delivered by the feed. Non-positive or non-finite
    /// values mark a malformed row and never produce a combination.
    pub odds: f64,
}

impl OutcomeEntry {
    pub fn new(pick_no: u32, pick_name: impl Into<String>, odds: f64) -> Self {
        Self {
            pick_no,
            pick_name: pick_name.into(),
            odds,
        }
    }

    /// Whether the odds can take part in a combination.
    pub fn has_valid_odds(&self) -> bool {
        self.odds.is_finite() && self.odds > 0.0
    }
}

/// One wagering event leg: an ordered list of outcomes under an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// Identifier of the event (race card) this leg belongs to.
    pub event_id: u64,
    /// Position of the leg within its event.
    pub sequence_no: u32,
    pub name: String,
    #[serde(default)]
    pub start_time: Option<String>,
    pub outcomes: Vec<OutcomeEntry>,
    /// When the leg was read from the feed. `None` for caller-built legs.
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Leg {
    pub fn new(
        event_id: u64,
        sequence_no: u32,
        name: impl Into<String>,
        outcomes: Vec<OutcomeEntry>,
    ) -> Self {
        Self {
            event_id,
            sequence_no,
            name: name.into(),
            start_time: None,
            outcomes,
            fetched_at: None,
        }
    }

    /// Lightweight reference used inside combinations and history.
    pub fn to_ref(&self) -> LegRef {
        LegRef {
            event_id: self.event_id,
            sequence_no: self.sequence_no,
            name: self.name.clone(),
        }
    }

    /// Same event and same position: the two legs are the same leg.
    pub fn is_same_leg(&self, other: &Leg) -> bool {
        self.event_id == other.event_id && self.sequence_no == other.sequence_no
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "E{}-{} {} ({} picks)",
            self.event_id,
            self.sequence_no,
            self.name,
            self.outcomes.len()
        )
    }
}

/// One listed event (race day) open for fixed-odds play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: u64,
    pub name: String,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub slug: Option<String>,
}

impl fmt::Display for EventSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}  {}", self.event_id, self.name)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        if let Some(start) = &self.start_date {
            write!(f, " {start}")?;
        }
        Ok(())
    }
}

/// Identifies a leg without carrying its outcome list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegRef {
    pub event_id: u64,
    pub sequence_no: u32,
    pub name: String,
}

impl fmt::Display for LegRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}-{}", self.event_id, self.sequence_no)
    }
}

// ---------------------------------------------------------------------------
// Combinations and pricing
// ---------------------------------------------------------------------------

/// One pick from leg A paired with one pick from leg B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    pub leg_a: LegRef,
    pub leg_b: LegRef,
    pub pick_a: OutcomeEntry,
    pub pick_b: OutcomeEntry,
    /// `pick_a.odds * pick_b.odds`
    pub combined_odds: f64,
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-#{} ({:.2}) x {}-#{} ({:.2}) = {:.2}",
            self.leg_a,
            self.pick_a.pick_no,
            self.pick_a.odds,
            self.leg_b,
            self.pick_b.pick_no,
            self.pick_b.odds,
            self.combined_odds,
        )
    }
}

/// Stake sizing for a single combination under a maximum payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakePlan {
    /// Always a whole amount, never below the minimum stake.
    pub stake_amount: Decimal,
    pub odds: f64,
    pub potential_payout: Decimal,
    pub profit: Decimal,
}

/// A combination together with its stake plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedCombination {
    pub combination: Combination,
    pub stake: StakePlan,
}

impl fmt::Display for PricedCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} TL | {} | payout {} TL",
            self.stake.stake_amount, self.combination, self.stake.potential_payout
        )
    }
}

/// Total cost summary for one evaluated leg pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCost {
    pub leg_a: LegRef,
    pub leg_b: LegRef,
    pub valid_combinations: usize,
    pub total_cost: Decimal,
    pub average_cost: Decimal,
}

/// The cheapest leg pair and its execution-ordered stake plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAnalysisResult {
    pub leg_a: Leg,
    pub leg_b: Leg,
    /// Sorted by ascending stake; ties keep expansion order.
    pub combinations: Vec<PricedCombination>,
    pub total_cost: Decimal,
    pub average_cost: Decimal,
    pub min_stake: Decimal,
    pub max_stake: Decimal,
    /// Every evaluated pair, cheapest first.
    pub pair_costs: Vec<PairCost>,
}

impl CostAnalysisResult {
    /// Oldest feed timestamp among the two winning legs, if known.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        match (self.leg_a.fetched_at, self.leg_b.fetched_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether the plan was built from feed data older than `max_age`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let Some(fetched) = self.fetched_at() else {
            return false;
        };
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return false;
        };
        now - fetched > max_age
    }
}

impl fmt::Display for CostAnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x {} | {} combinations | total {} TL | avg {} TL | stake {}..{} TL",
            self.leg_a.to_ref(),
            self.leg_b.to_ref(),
            self.combinations.len(),
            self.total_cost,
            self.average_cost,
            self.min_stake,
            self.max_stake,
        )
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Login credentials for the external wagering service.
pub struct Credentials {
    pub ssn: SecretString,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(ssn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssn: SecretString::new(ssn.into()),
            password: SecretString::new(password.into()),
        }
    }

    /// A request can only be built when both fields are present.
    pub fn is_well_formed(&self) -> bool {
        !self.ssn.expose_secret().trim().is_empty()
            && !self.password.expose_secret().trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssn", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Per-account commission settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub enabled: bool,
    pub daily_commission: Decimal,
    pub notes: Option<String>,
}

/// Lifetime statistics kept per account.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountStats {
    pub coupons_played: u64,
    pub coupons_won: u64,
    pub total_staked: Decimal,
    pub total_won: Decimal,
    pub last_used: Option<DateTime<Utc>>,
}

impl AccountStats {
    /// Share of played coupons that were accepted, in percent.
    pub fn success_rate(&self) -> Decimal {
        if self.coupons_played == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.coupons_won) * Decimal::ONE_HUNDRED
            / Decimal::from(self.coupons_played))
        .round_dp(1)
    }

    pub fn net_profit(&self) -> Decimal {
        self.total_won - self.total_staked
    }
}

/// One stored credential set with its statistics.
#[derive(Debug, Clone)]
pub struct Account {
    pub account_name: String,
    pub credentials: std::sync::Arc<Credentials>,
    pub commission: CommissionConfig,
    pub stats: AccountStats,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(account_name: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            account_name: account_name.into(),
            credentials: std::sync::Arc::new(credentials),
            commission: CommissionConfig::default(),
            stats: AccountStats::default(),
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | played={} won={} ({}%) | staked={} TL | won={} TL",
            self.account_name,
            self.stats.coupons_played,
            self.stats.coupons_won,
            self.stats.success_rate(),
            self.stats.total_staked,
            self.stats.total_won,
        )
    }
}

/// Aggregated changes to apply to an account's statistics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsDelta {
    pub played: u64,
    pub won: u64,
    pub staked: Decimal,
    pub payout: Decimal,
}

// ---------------------------------------------------------------------------
// Wager history
// ---------------------------------------------------------------------------

/// One historical submission, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerAttemptRecord {
    pub id: String,
    pub account_name: String,
    pub combination: Combination,
    pub stake: Decimal,
    pub odds: f64,
    pub payout: Decimal,
    pub profit: Decimal,
    pub succeeded: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl WagerAttemptRecord {
    pub fn new(
        account_name: &str,
        priced: &PricedCombination,
        succeeded: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_name: account_name.to_string(),
            combination: priced.combination.clone(),
            stake: priced.stake.stake_amount,
            odds: priced.stake.odds,
            payout: priced.stake.potential_payout,
            profit: priced.stake.profit,
            succeeded,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for WagerAttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} | {} TL @ {:.2} | {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if self.succeeded { "OK " } else { "ERR" },
            self.account_name,
            self.stake,
            self.odds,
            self.message,
        )
    }
}

// ---------------------------------------------------------------------------
// Account tasks
// ---------------------------------------------------------------------------

/// Lifecycle of one account's pipeline within an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Idle -> Running -> {Completed | Failed}; nothing else.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Idle, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Idle => write!(f, "idle"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Ephemeral per-account orchestration state.
#[derive(Debug, Clone)]
pub struct AccountTask {
    pub account_name: String,
    status: TaskStatus,
    completed: usize,
    total: usize,
    pub results: Vec<WagerAttemptRecord>,
    pub failure: Option<String>,
}

impl AccountTask {
    pub fn new(account_name: impl Into<String>, total: usize) -> Self {
        Self {
            account_name: account_name.into(),
            status: TaskStatus::Idle,
            completed: 0,
            total,
            results: Vec::new(),
            failure: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// `(completed_count, total_count)`
    pub fn progress(&self) -> (usize, usize) {
        (self.completed, self.total)
    }

    /// Apply a status transition. Illegal transitions are ignored and
    /// reported as `false`.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Record one attempt and advance progress.
    pub fn record(&mut self, attempt: WagerAttemptRecord) {
        self.results.push(attempt);
        self.completed = (self.completed + 1).min(self.total);
    }

    /// Abort the pipeline: Running -> Failed.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.transition(TaskStatus::Failed) {
            self.failure = Some(reason.into());
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures of the combination and cost engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot price combination with odds {odds}")]
    Pricing { odds: f64 },

    #[error("No leg pair produced a priceable combination")]
    NoValidPair,
}

/// Caller-input failures rejected before any account pipeline starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrchestrationError {
    #[error("No accounts selected")]
    NoAccountsSelected,

    #[error("Plan contains no combinations")]
    EmptyPlan,

    #[error("Plan is stale: feed data is {age_secs}s old (max {max_age_secs}s)")]
    StalePlan { age_secs: i64, max_age_secs: u64 },
}

/// Failures of a single external-service attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WagerError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Validation call failed: {0}")]
    ValidationCall(String),

    #[error("event already started.")]
    AlreadyStarted,

    #[error("Wager rejected: {0}")]
    Rejected(String),

    #[error("External call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cannot build request: {0}")]
    HardAbort(String),
}

impl WagerError {
    /// Only a hard abort stops the rest of an account's pipeline.
    pub fn is_hard_abort(&self) -> bool {
        matches!(self, WagerError::HardAbort(_))
    }
}

/// Account and history store failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
