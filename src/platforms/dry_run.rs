//! Dry-run wagering client.
//!
//! Accepts every coupon without any network traffic. Used to rehearse a
//! plan end to end: pipelines, progress, persistence and reporting all run
//! as they would against the real service.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{Pick, PickStatus, Session, SubmitOutcome, WageringClient};
use crate::types::{Credentials, StakePlan, WagerError};

const PLATFORM_NAME: &str = "dry-run";

#[derive(Debug, Clone, Default)]
pub struct DryRunClient;

impl DryRunClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WageringClient for DryRunClient {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Session, WagerError> {
        Ok(Session {
            token: format!("dry-run-{}", Uuid::new_v4()),
            cookies: Vec::new(),
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
            .map(|p| PickStatus {
                pick_ref: p.to_string(),
                already_started: false,
            })
            .collect())
    }

    async fn play(
        &self,
        _session: &Session,
        picks: &[Pick],
        stake: &StakePlan,
    ) -> Result<SubmitOutcome, WagerError> {
        let runners: Vec<String> = picks.iter().map(|p| p.to_string()).collect();
        let reference = format!("dry-run-{}", Uuid::new_v4());
        info!(
            reference = %reference,
            runners = %runners.join(" x "),
            stake = %stake.stake_amount,
            odds = stake.odds,
            "[DRY RUN] Would play coupon"
        );
        Ok(SubmitOutcome {
            succeeded: true,
            message: format!("dry run: coupon {reference} not sent"),
            raw_result: Some(serde_json::json!({ "reference": reference })),
        })
    }

    fn name(&self) -> &str {
        PLATFORM_NAME
    }
}
