//! Scripted wagering client for integration testing.
//!
//! Answers every protocol step from a fixed script and records the
//! coupons it was asked to play, all in-memory.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pairplay::platforms::{Pick, PickStatus, Session, SubmitOutcome, WageringClient};
use pairplay::types::{Credentials, StakePlan, WagerError};

/// How the scripted service answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Script {
    /// Every coupon is accepted.
    Accept,
    /// The play call answers `success: false`.
    Refuse,
    /// The play call is rejected outright.
    Reject,
    /// Validation reports the first pick as already started.
    Started,
    /// The play call never answers.
    Hang,
}

/// One play call as the service saw it.
#[derive(Debug, Clone)]
pub struct PlayCall {
    pub picks: Vec<Pick>,
    pub stake: Decimal,
}

pub struct ScriptedClient {
    script: Script,
    logins: Arc<Mutex<usize>>,
    plays: Arc<Mutex<Vec<PlayCall>>>,
}

impl ScriptedClient {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            logins: Arc::new(Mutex::new(0)),
            plays: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn logins(&self) -> usize {
        *self.logins.lock().unwrap()
    }

    pub fn plays(&self) -> Vec<PlayCall> {
        self.plays.lock().unwrap().clone()
    }
}

#[async_trait]
impl WageringClient for ScriptedClient {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Session, WagerError> {
        let mut logins = self.logins.lock().unwrap();
        *logins += 1;
        Ok(Session {
            token: format!("token-{logins}"),
            cookies: vec![("platform".into(), "web".into())],
        })
    }

    async fn validate(
        &self,
        _session: &Session,
        picks: &[Pick],
        _stake: &StakePlan,
    ) -> Result<Vec<PickStatus>, WagerError> {
        Ok(picks
            .iter()
            .enumerate()
            .map(|(i, pick)| PickStatus {
                pick_ref: pick.to_string(),
                already_started: self.script == Script::Started && i == 0,
            })
            .collect())
    }

    async fn play(
        &self,
        _session: &Session,
        picks: &[Pick],
        stake: &StakePlan,
    ) -> Result<SubmitOutcome, WagerError> {
        self.plays.lock().unwrap().push(PlayCall {
            picks: picks.to_vec(),
            stake: stake.stake_amount,
        });

        match self.script {
            Script::Accept => Ok(SubmitOutcome {
                succeeded: true,
                message: "Kupon oynandı".into(),
                raw_result: None,
            }),
            Script::Refuse => Ok(SubmitOutcome {
                succeeded: false,
                message: "Yetersiz bakiye".into(),
                raw_result: None,
            }),
            Script::Reject => Err(WagerError::Rejected("HTTP 400: invalid coupon".into())),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(WagerError::Transport("connection reset".into()))
            }
            Script::Started => unreachable!("play is never reached once a pick has started"),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
