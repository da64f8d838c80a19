//! Configuration loaded from a TOML file plus `MATCHSCOUT_*` env overrides

use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Telegram delivery; notifications are disabled when absent.
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(true))
            .add_source(config::Environment::with_prefix("MATCHSCOUT").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file path, `sqlite:` URL or `sqlite::memory:`.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Fallback chat for operator-facing messages (`test-notify`).
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How far ahead of now a fixture may kick off to be scanned.
    pub lookahead_hours: i64,
    /// Seconds between scan passes in `run` mode.
    pub interval_secs: u64,
    /// Global cap on notifications enqueued by a single pass.
    pub max_notifications_per_run: u32,
    /// Result cap handed to the compiler per (user, filter) pair.
    pub max_matches_per_filter: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lookahead_hours: 48,
            interval_secs: 300,
            max_notifications_per_run: 50,
            max_matches_per_filter: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Cache rows expire this many hours after computation.
    pub cache_ttl_hours: i64,
    pub default_stake: Decimal,
    /// Decimal odds assumed when a fixture carries no bookmaker odds.
    pub default_odds: Decimal,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            default_stake: dec!(1),
            default_odds: dec!(2),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Token bucket capacity; refill rate is capacity per second.
    pub capacity: u32,
    /// Bounded acquire retries per delivery attempt.
    pub acquire_attempts: u32,
    /// Fixed delay between acquire retries.
    pub acquire_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            acquire_attempts: 5,
            acquire_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Seconds between polls of the job table.
    pub poll_interval_secs: u64,
    /// Delivery attempts before a notification job is failed for good.
    pub max_delivery_attempts: u32,
    /// Base for the exponential backoff between delivery attempts.
    pub backoff_base_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_delivery_attempts: 4,
            backoff_base_ms: 500,
        }
    }
}
