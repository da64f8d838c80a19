//! Matchscout — football fixture filter engine
//!
//! Scan upcoming fixtures against user filters, backtest filters against
//! historical results, deliver alerts over Telegram.

use clap::{Parser, Subcommand};
use matchscout::{
    backtest::BacktestEngine,
    config::Config,
    notify::{Notifier, RateLimiter, TelegramNotifier},
    scanner::{scan_loop, ScanCoordinator},
    storage::{Database, MemoryCounterStore},
    types::BetType,
    worker::Worker,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "matchscout")]
#[command(about = "Fixture filter engine with backtesting and Telegram alerts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan loop and job worker
    Run,
    /// Run a single scan pass and exit
    Scan,
    /// Backtest a filter against historical fixtures
    Backtest {
        /// Filter ID to backtest
        filter_id: i64,
        /// Bet type: home_win, away_win, draw, over_2.5, under_2.5
        bet_type: String,
        /// Seasons to include, e.g. -s 2023 -s 2024
        #[arg(short, long, required = true)]
        season: Vec<i32>,
        /// Stake per bet
        #[arg(long)]
        stake: Option<Decimal>,
        /// Include streak/drawdown/Kelly analytics (bypasses the cache)
        #[arg(long)]
        analytics: bool,
    },
    /// Validate filter conditions from a JSON file (- for stdin)
    Validate {
        /// Path to a JSON array of conditions
        path: String,
    },
    /// Test Telegram notification
    TestNotify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Scan => scan_once(config).await,
        Commands::Backtest {
            filter_id,
            bet_type,
            season,
            stake,
            analytics,
        } => run_backtest(config, filter_id, &bet_type, &season, stake, analytics).await,
        Commands::Validate { path } => validate_conditions(&path),
        Commands::TestNotify => test_notify(config).await,
    }
}

fn build_notifier(config: &Config) -> TelegramNotifier {
    match &config.telegram {
        Some(tg) => TelegramNotifier::new(tg.bot_token.clone()),
        None => {
            tracing::warn!("Telegram not configured, notifications disabled");
            TelegramNotifier::disabled()
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting matchscout");

    let db = Arc::new(Database::connect(&config.database.path).await?);
    let notifier = Arc::new(build_notifier(&config));
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::default()),
        config.rate_limit.capacity,
    );

    let coordinator = Arc::new(ScanCoordinator::new(
        db.clone(),
        db.clone(),
        db.clone(),
        config.scan.clone(),
    ));
    let engine = BacktestEngine::new(db.clone(), db.clone(), config.backtest.clone());
    let worker = Worker::new(
        db,
        notifier,
        limiter,
        engine,
        config.worker.clone(),
        config.rate_limit.clone(),
    );

    let interval = config.scan.interval_secs;
    let scan_handle = tokio::spawn(scan_loop(coordinator, interval));
    let worker_handle = tokio::spawn(async move { worker.run().await });

    tracing::info!("Scan loop and worker running, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scan_handle.abort();
    worker_handle.abort();
    Ok(())
}

async fn scan_once(config: Config) -> anyhow::Result<()> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let coordinator = ScanCoordinator::new(db.clone(), db.clone(), db.clone(), config.scan.clone());
    let stats = coordinator.run_scan().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_backtest(
    config: Config,
    filter_id: i64,
    bet_type: &str,
    seasons: &[i32],
    stake: Option<Decimal>,
    analytics: bool,
) -> anyhow::Result<()> {
    let bet_type = BetType::from_str(bet_type).map_err(anyhow::Error::msg)?;
    let stake = stake.unwrap_or(config.backtest.default_stake);

    let db = Arc::new(Database::connect(&config.database.path).await?);
    let engine = BacktestEngine::new(db.clone(), db, config.backtest.clone());
    let report = engine
        .run(filter_id, bet_type, seasons, stake, analytics)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn validate_conditions(path: &str) -> anyhow::Result<()> {
    let raw = if path == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    let conditions: Vec<matchscout::types::Condition> = serde_json::from_str(&raw)?;
    let errors = matchscout::rules::validate(&conditions);
    if errors.is_empty() {
        println!("ok: {} condition(s)", conditions.len());
        Ok(())
    } else {
        println!("{}", serde_json::to_string_pretty(&errors)?);
        anyhow::bail!("{} validation error(s)", errors.len())
    }
}

async fn test_notify(config: Config) -> anyhow::Result<()> {
    let Some(tg) = &config.telegram else {
        anyhow::bail!("telegram is not configured");
    };
    let notifier = TelegramNotifier::new(tg.bot_token.clone());
    notifier
        .deliver(&tg.chat_id, "matchscout test notification")
        .await?;
    println!("notification sent to {}", tg.chat_id);
    Ok(())
}
