//! Backtest engine
//!
//! Replays a filter over finished fixtures in the requested seasons and
//! simulates one bet per matched fixture. Plain runs are cached for 24h
//! keyed by (filter, bet type, sorted season set); analytics runs are never
//! cached. The async variant drives a `BacktestJob` through its progress
//! checkpoints so a crash mid-run leaves an inspectable state.

pub mod analytics;

pub use analytics::{Analytics, ConfidenceInterval, CurvePoint, Drawdown, MonthlyRow, Streaks};

use crate::compiler::{self, FixtureQuery, FixtureStore, OrderBy};
use crate::config::BacktestConfig;
use crate::error::{Error, Result};
use crate::storage::FilterStore;
use crate::types::{BacktestResult, BetResult, BetType, Fixture, FixtureStatus, JobStatus};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Matched-fixture cap per backtest run.
const MAX_BACKTEST_FIXTURES: u32 = 20_000;

/// One simulated bet, in fixture date order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedBet {
    pub fixture_id: i64,
    pub kickoff: DateTime<Utc>,
    pub result: BetResult,
    /// Decimal odds the bet was priced at (default when the fixture had none).
    pub odds: Decimal,
    pub profit: Decimal,
}

/// Everything a backtest run returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub filter_id: i64,
    pub bet_type: BetType,
    pub season_key: String,
    pub stake: Decimal,
    pub total_bets: u32,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    /// wins / (wins + losses) × 100; pushes excluded from the denominator.
    pub win_rate: Decimal,
    pub total_profit: Decimal,
    /// total profit / total staked over non-push bets × 100.
    pub roi_percentage: Decimal,
    /// True when served from the cache instead of recomputed.
    pub cached: bool,
    pub analytics: Option<Analytics>,
}

impl BacktestReport {
    fn from_cache(row: BacktestResult, stake: Decimal) -> Self {
        Self {
            filter_id: row.filter_id,
            bet_type: row.bet_type,
            season_key: row.season_key,
            stake,
            total_bets: row.total_bets,
            wins: row.wins,
            losses: row.losses,
            pushes: row.pushes,
            win_rate: row.win_rate,
            total_profit: row.total_profit,
            roi_percentage: row.roi_percentage,
            cached: true,
            analytics: None,
        }
    }
}

pub struct BacktestEngine {
    fixtures: Arc<dyn FixtureStore>,
    filters: Arc<dyn FilterStore>,
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(
        fixtures: Arc<dyn FixtureStore>,
        filters: Arc<dyn FilterStore>,
        config: BacktestConfig,
    ) -> Self {
        Self {
            fixtures,
            filters,
            config,
        }
    }

    /// Run a backtest, serving from the cache when possible.
    pub async fn run(
        &self,
        filter_id: i64,
        bet_type: BetType,
        seasons: &[i32],
        stake: Decimal,
        want_analytics: bool,
    ) -> Result<BacktestReport> {
        let season_key = BacktestResult::season_key(seasons);

        if !want_analytics {
            if let Some(row) = self
                .filters
                .get_backtest_result(filter_id, bet_type, &season_key)
                .await?
            {
                if !row.is_expired(Utc::now()) {
                    info!(filter_id, %bet_type, %season_key, "backtest served from cache");
                    return Ok(BacktestReport::from_cache(row, stake));
                }
            }
        }

        let filter = self.filters.get_filter(filter_id).await?;
        let bets = self
            .simulate(&filter.conditions, bet_type, seasons, stake)
            .await?;
        let mut report = aggregate(filter_id, bet_type, &season_key, stake, &bets);

        if want_analytics {
            report.analytics = Some(analytics::compute(&bets));
        } else {
            let now = Utc::now();
            let row = BacktestResult {
                filter_id,
                bet_type,
                season_key: season_key.clone(),
                total_bets: report.total_bets,
                wins: report.wins,
                losses: report.losses,
                pushes: report.pushes,
                win_rate: report.win_rate,
                total_profit: report.total_profit,
                roi_percentage: report.roi_percentage,
                computed_at: now,
                expires_at: now + Duration::hours(self.config.cache_ttl_hours),
            };
            self.filters.replace_backtest_result(&row).await?;
        }

        Ok(report)
    }

    async fn simulate(
        &self,
        conditions: &[crate::types::Condition],
        bet_type: BetType,
        seasons: &[i32],
        stake: Decimal,
    ) -> Result<Vec<SimulatedBet>> {
        let mut query = FixtureQuery::new(compiler::compile(conditions)?, MAX_BACKTEST_FIXTURES);
        query.seasons = Some(seasons.to_vec());
        query.status = Some(FixtureStatus::Finished);
        // Chronological order so streaks, drawdown and the profit curve read
        // forward in time.
        query.order = OrderBy::KickoffAsc;

        let fixtures = self.fixtures.find(&query).await?;
        Ok(fixtures
            .iter()
            .map(|f| self.simulate_bet(f, bet_type, stake))
            .collect())
    }

    fn simulate_bet(&self, fixture: &Fixture, bet_type: BetType, stake: Decimal) -> SimulatedBet {
        let result = resolve_outcome(fixture, bet_type);
        let odds = bet_odds(fixture, bet_type).unwrap_or(self.config.default_odds);
        let profit = match result {
            BetResult::Win => stake * (odds - Decimal::ONE),
            BetResult::Loss => -stake,
            BetResult::Push | BetResult::Pending => Decimal::ZERO,
        };
        SimulatedBet {
            fixture_id: fixture.id,
            kickoff: fixture.kickoff,
            result,
            odds,
            profit,
        }
    }

    /// Drive one `BacktestJob` through its lifecycle. Any failure is
    /// persisted on the job; this never leaves a job silently pending.
    pub async fn run_job(&self, job_id: Uuid) -> Result<()> {
        let job = self.filters.get_backtest_job(job_id).await?;
        if job.status != JobStatus::Pending {
            // Cancelled (or already picked up) between enqueue and now.
            info!(%job_id, status = %job.status, "skipping backtest job pickup");
            return Ok(());
        }

        self.filters
            .transition_job(job_id, JobStatus::Running, 10)
            .await?;

        match self.execute_job(&job).await {
            Ok(report) => {
                self.filters
                    .transition_job(job_id, JobStatus::Running, 90)
                    .await?;
                let payload = serde_json::to_value(&report)?;
                self.filters.complete_job(job_id, &payload).await?;
                info!(%job_id, "backtest job completed");
                Ok(())
            }
            Err(e) => {
                warn!(%job_id, error = %e, "backtest job failed");
                self.filters.fail_job(job_id, &e.to_string()).await?;
                Ok(())
            }
        }
    }

    async fn execute_job(&self, job: &crate::types::BacktestJob) -> Result<BacktestReport> {
        // Filter existence checked up front so a bad reference fails fast.
        self.filters.get_filter(job.filter_id).await?;
        self.filters
            .transition_job(job.id, JobStatus::Running, 30)
            .await?;
        self.filters
            .transition_job(job.id, JobStatus::Running, 50)
            .await?;
        self.run(job.filter_id, job.bet_type, &job.seasons, job.stake, false)
            .await
    }
}

/// Deterministic outcome of one bet from the final score. Missing scores are
/// a push for every bet type.
pub fn resolve_outcome(fixture: &Fixture, bet_type: BetType) -> BetResult {
    let (Some(home), Some(away)) = (fixture.home_score, fixture.away_score) else {
        return BetResult::Push;
    };
    let won = match bet_type {
        BetType::HomeWin => home > away,
        BetType::AwayWin => away > home,
        BetType::Draw => home == away,
        BetType::Over25 => Decimal::from(home + away) > dec!(2.5),
        BetType::Under25 => Decimal::from(home + away) < dec!(2.5),
    };
    if won {
        BetResult::Win
    } else {
        BetResult::Loss
    }
}

/// Market odds backing a bet type, when the fixture carries them. The
/// over/under markets are not ingested, so those always use the default.
fn bet_odds(fixture: &Fixture, bet_type: BetType) -> Option<Decimal> {
    match bet_type {
        BetType::HomeWin => fixture.home_odds,
        BetType::AwayWin => fixture.away_odds,
        BetType::Draw => fixture.draw_odds,
        BetType::Over25 | BetType::Under25 => None,
    }
}

fn aggregate(
    filter_id: i64,
    bet_type: BetType,
    season_key: &str,
    stake: Decimal,
    bets: &[SimulatedBet],
) -> BacktestReport {
    let wins = bets.iter().filter(|b| b.result == BetResult::Win).count() as u32;
    let losses = bets.iter().filter(|b| b.result == BetResult::Loss).count() as u32;
    let pushes = bets.iter().filter(|b| b.result == BetResult::Push).count() as u32;

    let decided = wins + losses;
    let win_rate = if decided == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(wins) / Decimal::from(decided) * dec!(100)).round_dp(2)
    };

    let total_profit: Decimal = bets.iter().map(|b| b.profit).sum();
    let staked = stake * Decimal::from(decided);
    let roi_percentage = if staked.is_zero() {
        Decimal::ZERO
    } else {
        (total_profit / staked * dec!(100)).round_dp(2)
    };

    BacktestReport {
        filter_id,
        bet_type,
        season_key: season_key.to_string(),
        stake,
        total_bets: bets.len() as u32,
        wins,
        losses,
        pushes,
        win_rate,
        total_profit,
        roi_percentage,
        cached: false,
        analytics: None,
    }
}
