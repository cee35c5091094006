//! pairplay — two-leg combination pricing and multi-account execution.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches the CLI subcommands. `play` runs the orchestrator with
//! graceful Ctrl+C cancellation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pairplay::config::AppConfig;
use pairplay::engine::{AccountOrchestrator, Accountant, LogSink};
use pairplay::platforms::bitalih::BitalihClient;
use pairplay::platforms::dry_run::DryRunClient;
use pairplay::platforms::WageringClient;
use pairplay::storage::{AccountStore, HistoryStore, MemoryStore, SqliteStore};
use pairplay::strategy::CostAnalyzer;
use pairplay::types::{Account, CommissionConfig, CostAnalysisResult, Credentials, Leg};

#[derive(Parser)]
#[command(
    name = "pairplay",
    about = "Price every two-leg combination and play the cheapest pair across accounts",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, env = "PAIRPLAY_CONFIG", default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List events currently open for fixed-odds play
    Events,

    /// Fetch two events and show the cheapest leg pair
    Analyze {
        #[command(flatten)]
        events: EventArgs,
    },

    /// Analyze, then play the plan on the selected accounts
    Play {
        #[command(flatten)]
        events: EventArgs,

        /// Account to play on (repeatable)
        #[arg(long = "account")]
        accounts: Vec<String>,

        /// Play on every stored account
        #[arg(long, conflicts_with = "accounts")]
        all_accounts: bool,

        /// Rehearse without contacting the wagering service
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage stored accounts
    Accounts {
        #[command(subcommand)]
        subcommand: AccountsCommand,
    },

    /// Show recent wager attempts
    History {
        #[arg(long)]
        account: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Show aggregate statistics
    Stats,
}

#[derive(clap::Args)]
struct EventArgs {
    /// Event (race day) id for leg A
    #[arg(long)]
    event_a: u64,

    /// Event (race day) id for leg B
    #[arg(long)]
    event_b: u64,

    /// Override the configured maximum payout per combination
    #[arg(long)]
    max_payout: Option<f64>,

    /// Allow pairing a leg with itself
    #[arg(long)]
    no_same_event_filter: bool,
}

#[derive(Subcommand)]
enum AccountsCommand {
    /// List accounts with their statistics
    List,

    /// Add an account; credentials are read from environment variables
    Add {
        name: String,

        #[arg(long)]
        ssn_env: String,

        #[arg(long)]
        password_env: String,

        /// Daily commission (enables commission tracking)
        #[arg(long)]
        commission: Option<f64>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Remove an account and its history
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load(&cli.config)?;
    info!(config = %cli.config, dry_run = cfg.wagering.dry_run, "pairplay starting");

    match cli.command {
        Commands::Events => {
            let feed = BitalihClient::new(
                &cfg.wagering.base_url,
                &cfg.wagering.user_agent,
                cfg.orchestrator_config().call_timeout,
            )?;
            let events = feed.fetch_events().await?;
            if events.is_empty() {
                println!("No open events.");
            }
            for event in events {
                println!("{event}");
            }
        }
        Commands::Analyze { events } => {
            let plan = build_plan(&cfg, &events).await?;
            print_plan(&plan);
        }
        Commands::Play {
            events,
            accounts,
            all_accounts,
            dry_run,
        } => {
            let store = Arc::new(SqliteStore::connect(&cfg.storage.database_url).await?);
            let selected = select_accounts(store.as_ref(), &accounts, all_accounts).await?;
            let plan = build_plan(&cfg, &events).await?;
            print_plan(&plan);
            play(&cfg, store, selected, &plan, dry_run || cfg.wagering.dry_run).await?;
        }
        Commands::Accounts { subcommand } => {
            let store = SqliteStore::connect(&cfg.storage.database_url).await?;
            run_accounts_command(&store, subcommand).await?;
        }
        Commands::History { account, limit } => {
            let store = SqliteStore::connect(&cfg.storage.database_url).await?;
            let records = store.query(account, limit).await?;
            if records.is_empty() {
                println!("No wager history.");
            }
            for record in records {
                println!("{record}");
            }
        }
        Commands::Stats => {
            let store = SqliteStore::connect(&cfg.storage.database_url).await?;
            let accounts = store.list().await?;
            let history = store.query(None, usize::MAX).await?;
            print!("{}", Accountant::statistics(&accounts, &history));
        }
    }

    Ok(())
}

async fn build_plan(cfg: &AppConfig, events: &EventArgs) -> Result<CostAnalysisResult> {
    let mut analyzer_config = cfg.analyzer_config()?;
    if let Some(max_payout) = events.max_payout {
        analyzer_config.max_payout =
            Decimal::from_f64(max_payout).context("--max-payout is not a valid amount")?;
    }
    if events.no_same_event_filter {
        analyzer_config.same_event_filter = false;
    }

    let feed = BitalihClient::new(
        &cfg.wagering.base_url,
        &cfg.wagering.user_agent,
        cfg.orchestrator_config().call_timeout,
    )?;
    let group_a = feed.fetch_legs(events.event_a).await?;
    let group_b: Vec<Leg> = if events.event_b == events.event_a {
        group_a.clone()
    } else {
        feed.fetch_legs(events.event_b).await?
    };

    CostAnalyzer::new(analyzer_config)
        .analyze(&group_a, &group_b)
        .with_context(|| format!("No playable pair for events {} and {}", events.event_a, events.event_b))
}

async fn select_accounts(store: &dyn AccountStore, names: &[String], all: bool) -> Result<Vec<Account>> {
    if all {
        return Ok(store.list().await?);
    }
    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        selected.push(store.get(name).await.with_context(|| format!("Unknown account: {name}"))?);
    }
    Ok(selected)
}

async fn play(
    cfg: &AppConfig,
    store: Arc<SqliteStore>,
    accounts: Vec<Account>,
    plan: &CostAnalysisResult,
    dry_run: bool,
) -> Result<()> {
    // Dry runs record into a throwaway store so real statistics stay untouched.
    let client: Arc<dyn WageringClient>;
    let account_store: Arc<dyn AccountStore>;
    let history_store: Arc<dyn HistoryStore>;
    if dry_run {
        warn!("Dry run: no coupons will be sent");
        let scratch = Arc::new(MemoryStore::with_accounts(accounts.clone()));
        client = Arc::new(DryRunClient::new());
        account_store = scratch.clone();
        history_store = scratch;
    } else {
        client = Arc::new(BitalihClient::new(
            &cfg.wagering.base_url,
            &cfg.wagering.user_agent,
            cfg.orchestrator_config().call_timeout,
        )?);
        account_store = store.clone();
        history_store = store;
    }

    let orchestrator = AccountOrchestrator::new(
        client,
        account_store,
        history_store,
        cfg.orchestrator_config(),
    );

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if watch_shutdown(tokio::signal::ctrl_c, watcher).await {
            warn!("Second shutdown signal received, exiting immediately");
            std::process::exit(130);
        }
    });

    info!("Playing plan. Press Ctrl+C to stop after the current submissions, twice to quit.");
    let report = orchestrator
        .run(accounts, plan, Arc::new(LogSink), cancel)
        .await?;

    print!("{report}");
    Ok(())
}

async fn run_accounts_command(store: &SqliteStore, command: AccountsCommand) -> Result<()> {
    match command {
        AccountsCommand::List => {
            let accounts = store.list().await?;
            if accounts.is_empty() {
                println!("No accounts.");
            }
            for account in accounts {
                println!("{account}");
            }
        }
        AccountsCommand::Add {
            name,
            ssn_env,
            password_env,
            commission,
            notes,
        } => {
            let credentials = Credentials::new(
                AppConfig::resolve_env(&ssn_env)?,
                AppConfig::resolve_env(&password_env)?,
            );
            if !credentials.is_well_formed() {
                anyhow::bail!("Credentials for {name} are empty");
            }
            let daily_commission = match commission {
                Some(amount) => Decimal::from_f64(amount).context("--commission is not a valid amount")?,
                None => Decimal::ZERO,
            };
            let commission = CommissionConfig {
                enabled: commission.is_some(),
                daily_commission,
                notes,
            };
            let account = store.create(&name, credentials, commission).await?;
            println!("Added {account}");
        }
        AccountsCommand::Remove { name } => {
            store.delete(&name).await?;
            println!("Removed {name}");
        }
    }
    Ok(())
}

fn print_plan(plan: &CostAnalysisResult) {
    println!("{plan}");
    for (i, priced) in plan.combinations.iter().enumerate() {
        println!("  {:>3}. {priced}", i + 1);
    }
    if plan.pair_costs.len() > 1 {
        println!("Other pairs:");
        for pair in plan.pair_costs.iter().skip(1).take(5) {
            println!(
                "  {} x {}: {} combinations, {} TL",
                pair.leg_a, pair.leg_b, pair.valid_combinations, pair.total_cost
            );
        }
    }
}

/// Cancel `cancel` on the first signal; `true` once a second signal
/// asks to quit. `false` if signals cannot be listened for.
async fn watch_shutdown<F, Fut>(mut next_signal: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        warn!(error = %e, "Cannot listen for shutdown signals");
        return false;
    }
    warn!("Shutdown signal received, finishing in-flight submissions (Ctrl+C again to quit)");
    cancel.cancel();

    match next_signal().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Cannot listen for shutdown signals");
            false
        }
    }
}

/// Initialise the tracing subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pairplay=info"));

    let json_logging = std::env::var("PAIRPLAY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
