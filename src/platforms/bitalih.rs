//! Bitalih fixed-odds (TJK "sabit ihtimalli") integration.
//!
//! Endpoints, all JSON over POST:
//! - `/api/auth/login` — `{ssn, password, remember}` → bearer token + cookies
//! - `/api/tjk/race/{id}/bulletin` — `{type: "fob"}` → legs with fixed odds
//! - `/api/tjk/coupon/fob/play/validate` — coupon pre-check (`isStartedRun`)
//! - `/api/tjk/coupon/fob/play` — place the coupon
//!
//! The event list comes from the fixed-odds landing page, requested in its
//! JSON (`Rsc: 1`) form, whose `fixoSummary` lists one row per race.
//!
//! Every response is wrapped in `{success, message?, data}`. Login nests a
//! second envelope: `data.success` and the token at `data.data.token`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, COOKIE, ORIGIN, REFERER, SET_COOKIE};
use reqwest::{Client, Response};
use rust_decimal::prelude::*;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Pick, PickStatus, Session, SubmitOutcome, WageringClient};
use crate::types::{Credentials, EventSummary, Leg, OutcomeEntry, StakePlan, WagerError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://www.bitalih.com";
const PLATFORM_NAME: &str = "bitalih";
const EVENT_LIST_PATH: &str = "/at-yarisi/tjk-sabit-ihtimalli-bahis";

/// Request limit used when the caller does not supply one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cookies the web client always sends.
const BASE_COOKIES: &[(&str, &str)] = &[("platform", "web")];

// ---------------------------------------------------------------------------
// Bitalih API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    ssn: &'a str,
    password: &'a str,
    remember: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<LoginUser>,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CouponRequest<'a> {
    runners: &'a [Pick],
    amount: String,
    multiplier: u64,
    complete: bool,
    odd_at_play: String,
    count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationItem {
    #[serde(default)]
    is_started_run: bool,
    #[serde(default)]
    run_no: Option<u32>,
    #[serde(default)]
    horse_no: Option<u32>,
}

#[derive(Debug, Serialize)]
struct BulletinRequest {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct BulletinData {
    race: BulletinRace,
}

#[derive(Debug, Deserialize)]
struct BulletinRace {
    #[serde(default)]
    runs: Vec<BulletinRun>,
}

#[derive(Debug, Deserialize)]
struct BulletinRun {
    number: u32,
    #[serde(default)]
    info: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    horses: Vec<BulletinHorse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulletinHorse {
    no: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    fixed_odd: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListPage {
    #[serde(default)]
    fixo_summary: Option<Vec<FixoSummaryRow>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixoSummaryRow {
    race_id: u64,
    #[serde(default)]
    start_date: Option<String>,
    hippodrome: Hippodrome,
}

#[derive(Debug, Deserialize)]
struct Hippodrome {
    name: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the Bitalih web API.
///
/// Holds no session state: every submission logs in afresh, so one client
/// is shared by all account pipelines.
pub struct BitalihClient {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

impl BitalihClient {
    /// `request_timeout` bounds every HTTP exchange and should match the
    /// per-step call timeout, so an expiry reads the same either way.
    pub fn new(base_url: impl Into<String>, user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(&base_url).context("Base URL is not a valid Origin header")?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&format!("{base_url}/"))
                .context("Base URL is not a valid Referer header")?,
        );

        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client for Bitalih")?;

        Ok(Self {
            http,
            base_url,
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the fixed-odds bulletin of one event (race day).
    pub async fn fetch_legs(&self, event_id: u64) -> Result<Vec<Leg>> {
        let url = self.url(&format!("/api/tjk/race/{event_id}/bulletin"));
        debug!(event_id, url = %url, "Fetching bulletin");

        let resp = self
            .http
            .post(&url)
            .header(COOKIE, base_cookie_header())
            .json(&BulletinRequest { kind: "fob" })
            .send()
            .await
            .with_context(|| format!("Bulletin request for event {event_id} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Bulletin request for event {event_id} failed {status}: {body}");
        }

        let body = resp.text().await.context("Failed to read bulletin response")?;
        let legs = parse_bulletin(event_id, &body, Utc::now())?;
        info!(event_id, legs = legs.len(), "Bulletin fetched");
        Ok(legs)
    }

    /// List the events currently open for fixed-odds play.
    pub async fn fetch_events(&self) -> Result<Vec<EventSummary>> {
        let url = self.url(EVENT_LIST_PATH);
        debug!(url = %url, "Fetching event list");

        let resp = self
            .http
            .get(&url)
            .header(COOKIE, base_cookie_header())
            .header("Rsc", "1")
            .send()
            .await
            .context("Event list request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Event list request failed {status}");
        }

        let body = resp.text().await.context("Failed to read event list response")?;
        let events = parse_event_list(&body)?;
        info!(events = events.len(), "Event list fetched");
        Ok(events)
    }

    /// POST a coupon body with the session's token and cookies.
    async fn post_coupon(
        &self,
        path: &str,
        session: &Session,
        picks: &[Pick],
        stake: &StakePlan,
    ) -> Result<Response, WagerError> {
        let body = coupon_request(picks, stake)?;
        self.http
            .post(self.url(path))
            .header(AUTHORIZATION, format!("Bearer {}", session.token))
            .header(COOKIE, session.cookie_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.request_timeout))
    }
}

#[async_trait]
impl WageringClient for BitalihClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, WagerError> {
        let request = LoginRequest {
            ssn: credentials.ssn.expose_secret(),
            password: credentials.password.expose_secret(),
            remember: false,
        };

        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .header(COOKIE, base_cookie_header())
            .json(&request)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.request_timeout))?;

        let status = resp.status();
        let set_cookies: Vec<String> = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();

        if !status.is_success() {
            return Err(WagerError::Authentication(format!("HTTP {status}")));
        }

        let body = resp.text().await.map_err(|e| map_request_error(e, self.request_timeout))?;
        let token = parse_login(&body)?;

        let mut session = Session {
            token,
            cookies: BASE_COOKIES
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        };
        for raw in &set_cookies {
            if let Some((name, value)) = parse_set_cookie(raw) {
                session.cookies.retain(|(n, _)| n != &name);
                session.cookies.push((name, value));
            }
        }

        debug!(cookies = session.cookies.len(), "Bitalih login succeeded");
        Ok(session)
    }

    async fn validate(
        &self,
        session: &Session,
        picks: &[Pick],
        stake: &StakePlan,
    ) -> Result<Vec<PickStatus>, WagerError> {
        let resp = self
            .post_coupon("/api/tjk/coupon/fob/play/validate", session, picks, stake)
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WagerError::ValidationCall(format!("HTTP {status}: {body}")));
        }

        let body = resp.text().await.map_err(|e| map_request_error(e, self.request_timeout))?;
        parse_validation(picks, &body)
    }

    async fn play(
        &self,
        session: &Session,
        picks: &[Pick],
        stake: &StakePlan,
    ) -> Result<SubmitOutcome, WagerError> {
        let resp = self
            .post_coupon("/api/tjk/coupon/fob/play", session, picks, stake)
            .await?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| map_request_error(e, self.request_timeout))?;
        if status.is_client_error() {
            return Err(WagerError::Rejected(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            return Err(WagerError::Transport(format!("HTTP {status}: {body}")));
        }

        let outcome = parse_play(&body)?;
        if !outcome.succeeded {
            warn!(message = %outcome.message, "Bitalih refused coupon");
        }
        Ok(outcome)
    }

    fn name(&self) -> &str {
        PLATFORM_NAME
    }
}

// ---------------------------------------------------------------------------
// Request/response helpers
// ---------------------------------------------------------------------------

fn base_cookie_header() -> String {
    BASE_COOKIES
        .iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn map_request_error(e: reqwest::Error, limit: Duration) -> WagerError {
    if e.is_timeout() {
        WagerError::Timeout(limit)
    } else if e.is_builder() {
        WagerError::HardAbort(e.to_string())
    } else {
        WagerError::Transport(e.to_string())
    }
}

/// Coupon body shared by validate and play. The service expects the stake
/// as a whole-number string and repeats it as the multiplier.
fn coupon_request<'a>(picks: &'a [Pick], stake: &StakePlan) -> Result<CouponRequest<'a>, WagerError> {
    let multiplier = stake
        .stake_amount
        .trunc()
        .to_u64()
        .ok_or_else(|| WagerError::HardAbort(format!("stake {} out of range", stake.stake_amount)))?;

    Ok(CouponRequest {
        runners: picks,
        amount: multiplier.to_string(),
        multiplier,
        complete: false,
        odd_at_play: stake.odds.to_string(),
        count: 1,
    })
}

/// `name=value; Path=/; HttpOnly` → `(name, value)`.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

fn parse_login(body: &str) -> Result<String, WagerError> {
    let envelope: Envelope<LoginData> = serde_json::from_str(body)
        .map_err(|e| WagerError::Authentication(format!("malformed login response: {e}")))?;

    let message = envelope.message.clone();
    let data = envelope
        .data
        .filter(|_| envelope.success)
        .ok_or_else(|| WagerError::Authentication(message.unwrap_or_else(|| "login rejected".into())))?;

    if !data.success {
        return Err(WagerError::Authentication(
            data.message.unwrap_or_else(|| "invalid credentials".into()),
        ));
    }

    data.data
        .and_then(|user| user.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| WagerError::Authentication("login succeeded but no token returned".into()))
}

fn parse_validation(picks: &[Pick], body: &str) -> Result<Vec<PickStatus>, WagerError> {
    let envelope: Envelope<Vec<ValidationItem>> = serde_json::from_str(body)
        .map_err(|e| WagerError::ValidationCall(format!("malformed validation response: {e}")))?;

    if !envelope.success {
        return Err(WagerError::ValidationCall(
            envelope.message.unwrap_or_else(|| "coupon did not validate".into()),
        ));
    }

    Ok(envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let pick_ref = match (picks.get(i), item.run_no, item.horse_no) {
                (Some(pick), _, _) => pick.to_string(),
                (None, Some(run), Some(horse)) => format!("{run}-#{horse}"),
                (None, _, _) => format!("runner {i}"),
            };
            PickStatus {
                pick_ref,
                already_started: item.is_started_run,
            }
        })
        .collect())
}

fn parse_play(body: &str) -> Result<SubmitOutcome, WagerError> {
    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| WagerError::Transport(format!("malformed play response: {e}")))?;

    let succeeded = raw.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
    let message = raw
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if succeeded {
                "coupon played".to_string()
            } else {
                "coupon rejected".to_string()
            }
        });

    Ok(SubmitOutcome {
        succeeded,
        message,
        raw_result: Some(raw),
    })
}

/// Odds arrive as a number, a numeric string, or null.
fn parse_odds(value: Option<&serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Convert a bulletin response body into legs stamped with `fetched_at`.
///
/// Runners without usable odds are kept with odds `0.0`; the combination
/// engine drops them.
pub fn parse_bulletin(event_id: u64, body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<Leg>> {
    let envelope: Envelope<BulletinData> =
        serde_json::from_str(body).context("Failed to parse bulletin response")?;

    if !envelope.success {
        anyhow::bail!(
            "Bulletin for event {event_id} unavailable: {}",
            envelope.message.unwrap_or_default()
        );
    }
    let data = envelope
        .data
        .with_context(|| format!("Bulletin for event {event_id} has no data"))?;

    Ok(data
        .race
        .runs
        .into_iter()
        .map(|run| {
            let outcomes = run
                .horses
                .into_iter()
                .map(|h| {
                    let name = h.name.unwrap_or_else(|| format!("#{}", h.no));
                    OutcomeEntry::new(h.no, name, parse_odds(h.fixed_odd.as_ref()))
                })
                .collect();
            let name = run.info.unwrap_or_else(|| format!("{}. Ayak", run.number));
            let mut leg = Leg::new(event_id, run.number, name, outcomes);
            leg.start_time = run.time;
            leg.fetched_at = Some(fetched_at);
            leg
        })
        .collect())
}

/// Parse the event list page. Races repeat per leg; the first row of each
/// race wins.
pub fn parse_event_list(body: &str) -> Result<Vec<EventSummary>> {
    let page: EventListPage =
        serde_json::from_str(body).context("Event list response is not JSON")?;
    let rows = page
        .fixo_summary
        .context("Event list response has no fixoSummary")?;

    let mut seen = HashSet::new();
    Ok(rows
        .into_iter()
        .filter(|row| seen.insert(row.race_id))
        .map(|row| EventSummary {
            event_id: row.race_id,
            name: row.hippodrome.name,
            location: row.hippodrome.location,
            start_date: row.start_date,
            slug: row.hippodrome.slug,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
