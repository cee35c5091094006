//! Wagering platform integrations.
//!
//! Defines the `WageringClient` trait and provides implementations for:
//! - Bitalih — real-money fixed-odds coupons (authenticate → validate → play)
//! - Dry run — local no-op client for rehearsing a plan

pub mod bitalih;
pub mod dry_run;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::types::{Combination, Credentials, PricedCombination, StakePlan, WagerError};

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Authenticated session state captured at login and reused for the
/// validate and play calls of the same submission.
#[derive(Clone, Default)]
pub struct Session {
    pub token: String,
    pub cookies: Vec<(String, String)>,
}

impl Session {
    /// `name=value; name=value` form for a `Cookie` header.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("cookies", &self.cookies.len())
            .finish()
    }
}

/// One selected runner as the wagering service addresses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pick {
    #[serde(rename = "raceId")]
    pub event_id: u64,
    #[serde(rename = "runNo")]
    pub sequence_no: u32,
    #[serde(rename = "horseNo")]
    pub pick_no: u32,
}

impl Pick {
    /// Both picks of a combination, leg A first.
    pub fn from_combination(combination: &Combination) -> Vec<Pick> {
        vec![
            Pick {
                event_id: combination.leg_a.event_id,
                sequence_no: combination.leg_a.sequence_no,
                pick_no: combination.pick_a.pick_no,
            },
            Pick {
                event_id: combination.leg_b.event_id,
                sequence_no: combination.leg_b.sequence_no,
                pick_no: combination.pick_b.pick_no,
            },
        ]
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}-{}-#{}", self.event_id, self.sequence_no, self.pick_no)
    }
}

/// Validation verdict for a single pick.
#[derive(Debug, Clone, PartialEq)]
pub struct PickStatus {
    pub pick_ref: String,
    pub already_started: bool,
}

/// Result of the final play call.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub succeeded: bool,
    pub message: String,
    pub raw_result: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Abstraction over the external wagering service.
///
/// The three protocol steps are exposed individually; `submit` chains them
/// for one combination with a fresh session, bounding every step with the
/// caller-supplied timeout.
#[async_trait]
pub trait WageringClient: Send + Sync {
    /// Log in and capture the session token and cookies.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, WagerError>;

    /// Ask the service whether the coupon can be played.
    async fn validate(
        &self,
        session: &Session,
        picks: &[Pick],
        stake: &StakePlan,
    ) -> Result<Vec<PickStatus>, WagerError>;

    /// Place the coupon.
    async fn play(
        &self,
        session: &Session,
        picks: &[Pick],
        stake: &StakePlan,
    ) -> Result<SubmitOutcome, WagerError>;

    /// Client name for logging and identification.
    fn name(&self) -> &str;

    /// Authenticate, validate and play a single priced combination.
    async fn submit(
        &self,
        credentials: &Credentials,
        priced: &PricedCombination,
        timeout: Duration,
    ) -> Result<SubmitOutcome, WagerError> {
        if !credentials.is_well_formed() {
            return Err(WagerError::HardAbort("credentials are incomplete".into()));
        }
        let picks = Pick::from_combination(&priced.combination);

        let session = with_timeout(timeout, self.authenticate(credentials)).await?;
        let statuses = with_timeout(timeout, self.validate(&session, &picks, &priced.stake)).await?;
        if statuses.iter().any(|s| s.already_started) {
            return Err(WagerError::AlreadyStarted);
        }
        with_timeout(timeout, self.play(&session, &picks, &priced.stake)).await
    }
}

/// Bound one external call; elapsing fails just that call.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, WagerError>
where
    F: Future<Output = Result<T, WagerError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| WagerError::Timeout(limit))?
}
