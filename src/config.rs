//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Account secrets are never stored here; the CLI references them by
//! env-var name and resolves them at runtime via `resolve_env`.

use anyhow::{Context, Result};
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::OrchestratorConfig;
use crate::platforms::bitalih::DEFAULT_BASE_URL;
use crate::strategy::CostAnalyzerConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub wagering: WageringConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Target payout per combination, in TL.
    pub max_payout: f64,
    pub same_event_filter: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_payout: 2500.0,
            same_event_filter: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrchestratorSection {
    pub submit_delay_ms: u64,
    pub call_timeout_secs: u64,
    /// 0 disables the stale-plan guard.
    pub max_plan_age_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            submit_delay_ms: 3000,
            call_timeout_secs: 10,
            max_plan_age_secs: 900,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WageringConfig {
    pub base_url: String,
    pub user_agent: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for WageringConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: concat!("pairplay/", env!("CARGO_PKG_VERSION")).to_string(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://pairplay.db?mode=rwc".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.engine.max_payout.is_finite() && self.engine.max_payout > 0.0) {
            anyhow::bail!("engine.max_payout must be positive, got {}", self.engine.max_payout);
        }
        if self.orchestrator.call_timeout_secs == 0 {
            anyhow::bail!("orchestrator.call_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced on the command line.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn analyzer_config(&self) -> Result<CostAnalyzerConfig> {
        let max_payout = Decimal::from_f64(self.engine.max_payout)
            .context("engine.max_payout is not representable as a decimal")?;
        Ok(CostAnalyzerConfig {
            max_payout,
            same_event_filter: self.engine.same_event_filter,
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let section = &self.orchestrator;
        OrchestratorConfig {
            submit_delay: Duration::from_millis(section.submit_delay_ms),
            call_timeout: Duration::from_secs(section.call_timeout_secs),
            max_plan_age: (section.max_plan_age_secs > 0)
                .then(|| Duration::from_secs(section.max_plan_age_secs)),
        }
    }
}
