//! Core domain types shared across the crate
//!
//! Fixtures and per-team aggregates are read-only here (owned by the ingest
//! side); filters, matches, cache rows and jobs are owned by this crate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixtureStatus::Scheduled => "scheduled",
            FixtureStatus::Live => "live",
            FixtureStatus::Finished => "finished",
            FixtureStatus::Postponed => "postponed",
            FixtureStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for FixtureStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(FixtureStatus::Scheduled),
            "live" => Ok(FixtureStatus::Live),
            "finished" => Ok(FixtureStatus::Finished),
            "postponed" => Ok(FixtureStatus::Postponed),
            "cancelled" => Ok(FixtureStatus::Cancelled),
            other => Err(format!("unknown fixture status: {other}")),
        }
    }
}

/// One football fixture. Scores and odds are null until known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub league_id: i64,
    pub season: i32,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: FixtureStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    /// Pre-match 1X2 decimal odds, when a bookmaker feed provided them.
    pub home_odds: Option<Decimal>,
    pub draw_odds: Option<Decimal>,
    pub away_odds: Option<Decimal>,
}

impl Fixture {
    pub fn is_finished(&self) -> bool {
        self.status == FixtureStatus::Finished
    }

    /// Total goals, only when both scores are present.
    pub fn total_goals(&self) -> Option<i32> {
        Some(self.home_score? + self.away_score?)
    }
}

/// Per (team, season) aggregate, recomputed by an external job.
/// Averages are decimal to keep ratio math exact at the store boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamComputedStat {
    pub team_id: i64,
    pub season: i32,
    pub goals_avg: Decimal,
    pub conceded_avg: Decimal,
    pub clean_sheet_avg: Decimal,
    pub form_avg: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "between")]
    Between,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::In => "in",
            Operator::Between => "between",
        };
        f.write_str(s)
    }
}

/// Condition value: scalar for comparison operators, list for `in`/`between`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(Decimal),
    Text(String),
    List(Vec<ConditionValue>),
}

impl ConditionValue {
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            ConditionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConditionValue]> {
        match self {
            ConditionValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// One (field, operator, value) clause within a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

/// A named, user-owned set of conditions used to select fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub conditions: Vec<Condition>,
    pub active: bool,
    pub alerts_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// A user eligible to receive scan alerts: verified channel, owns at least
/// one active, alert-enabled filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertUser {
    pub id: i64,
    pub telegram_chat_id: String,
}

/// Simulated bet outcome on one matched fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetResult {
    Pending,
    Win,
    Loss,
    Push,
}

impl fmt::Display for BetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BetResult::Pending => "pending",
            BetResult::Win => "win",
            BetResult::Loss => "loss",
            BetResult::Push => "push",
        };
        f.write_str(s)
    }
}

impl FromStr for BetResult {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BetResult::Pending),
            "win" => Ok(BetResult::Win),
            "loss" => Ok(BetResult::Loss),
            "push" => Ok(BetResult::Push),
            other => Err(format!("unknown bet result: {other}")),
        }
    }
}

/// Dedup/audit record linking a filter to a fixture it matched.
/// At most one row per (filter, fixture), enforced by a unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterMatch {
    pub id: i64,
    pub filter_id: i64,
    pub fixture_id: i64,
    pub matched_at: DateTime<Utc>,
    pub notification_sent: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub bet_result: BetResult,
}

/// Bet type a backtest simulates on every matched fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    HomeWin,
    AwayWin,
    Draw,
    #[serde(rename = "over_2.5")]
    Over25,
    #[serde(rename = "under_2.5")]
    Under25,
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BetType::HomeWin => "home_win",
            BetType::AwayWin => "away_win",
            BetType::Draw => "draw",
            BetType::Over25 => "over_2.5",
            BetType::Under25 => "under_2.5",
        };
        f.write_str(s)
    }
}

impl FromStr for BetType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "home_win" => Ok(BetType::HomeWin),
            "away_win" => Ok(BetType::AwayWin),
            "draw" => Ok(BetType::Draw),
            "over_2.5" => Ok(BetType::Over25),
            "under_2.5" => Ok(BetType::Under25),
            other => Err(format!("unknown bet type: {other}")),
        }
    }
}

/// Cached aggregate metrics for one (filter, bet type, season set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub filter_id: i64,
    pub bet_type: BetType,
    /// Sorted, comma-joined season list; part of the cache key.
    pub season_key: String,
    pub total_bets: u32,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub win_rate: Decimal,
    pub total_profit: Decimal,
    pub roi_percentage: Decimal,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BacktestResult {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn season_key(seasons: &[i32]) -> String {
        let mut sorted = seasons.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Status of an async backtest job. Completed, failed and cancelled are
/// terminal; transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Forward-only transition check; cancel is allowed from pending/running.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Async backtest execution record, driven by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestJob {
    pub id: Uuid,
    pub owner_id: i64,
    pub filter_id: i64,
    pub bet_type: BetType,
    pub seasons: Vec<i32>,
    pub stake: Decimal,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
