//! SQLite persistence
//!
//! `Database` wraps a `SqlitePool`, creates the schema on connect, and
//! implements the store seams the engines depend on. The
//! `UNIQUE (filter_id, fixture_id)` index on filter_matches is what actually
//! carries the notification-dedup invariant; the coordinator's pre-checks
//! only save work, they do not provide correctness.
//!
//! Queries are runtime-built (`sqlx::query` / `query_as` with `FromRow`
//! rows), no compile-time macros. Decimal values are stored as TEXT where
//! exact round-tripping matters (stakes, metrics) and as REAL where the
//! ingest feed owns them (odds, averages).


use crate::compiler::{BindValue, FixtureQuery, FixtureStore, OrderBy};
use crate::error::{Error, Result};
use crate::types::{
    AlertUser, BacktestJob, BacktestResult, BetResult, BetType, Condition, Filter, FilterMatch,
    Fixture, FixtureStatus, JobStatus, TeamComputedStat,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

mod schema;

/// Filter/match/job read-write store.
#[async_trait]
pub trait FilterStore: Send + Sync {
    async fn create_filter(
        &self,
        owner_id: i64,
        name: &str,
        conditions: &[Condition],
        alerts_enabled: bool,
    ) -> Result<Filter>;
    async fn get_filter(&self, id: i64) -> Result<Filter>;
    /// Users with a verified channel and at least one active, alert-enabled
    /// filter.
    async fn list_alert_users(&self) -> Result<Vec<AlertUser>>;
    async fn active_alert_filters(&self, owner_id: i64) -> Result<Vec<Filter>>;

    async fn match_exists(&self, filter_id: i64, fixture_id: i64) -> Result<bool>;
    /// Insert-if-absent; `None` means the unique index already held a row
    /// for this (filter, fixture) pair.
    async fn insert_match_if_absent(
        &self,
        filter_id: i64,
        fixture_id: i64,
    ) -> Result<Option<FilterMatch>>;
    async fn get_match(&self, id: i64) -> Result<FilterMatch>;
    async fn mark_match_notified(&self, match_id: i64) -> Result<()>;
    async fn record_match_error(&self, match_id: i64, error: &str) -> Result<()>;

    async fn get_backtest_result(
        &self,
        filter_id: i64,
        bet_type: BetType,
        season_key: &str,
    ) -> Result<Option<BacktestResult>>;
    /// Delete-then-insert by cache key. Concurrent writers of the same key
    /// race last-writer-wins; accepted, not serializable.
    async fn replace_backtest_result(&self, result: &BacktestResult) -> Result<()>;

    async fn create_backtest_job(&self, job: &BacktestJob) -> Result<()>;
    async fn get_backtest_job(&self, id: Uuid) -> Result<BacktestJob>;
    /// Forward-only status/progress update, committed immediately so a crash
    /// leaves an inspectable intermediate state.
    async fn transition_job(&self, id: Uuid, status: JobStatus, progress: u8) -> Result<()>;
    async fn complete_job(&self, id: Uuid, result: &serde_json::Value) -> Result<()>;
    async fn fail_job(&self, id: Uuid, error: &str) -> Result<()>;
    async fn cancel_job(&self, id: Uuid) -> Result<()>;
}

/// Fire-and-forget, at-least-once task enqueue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, task: &str, args: serde_json::Value) -> Result<()>;
}

/// Shared counter used by the rate limiter. `get` then `set` is not atomic
/// across the two calls; see `RateLimiter::acquire`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<f64>>;
    async fn set(&self, key: &str, value: f64) -> Result<()>;
}

/// In-process counter store. A multi-worker deployment would point this
/// seam at an external store (Redis or similar) instead.
#[derive(Default)]
pub struct MemoryCounterStore {
    values: RwLock<HashMap<String, f64>>,
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.values.read().get(key).copied())
    }

    async fn set(&self, key: &str, value: f64) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// A queued task claimed by the worker.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: i64,
    pub task: String,
    pub args: serde_json::Value,
    pub attempts: u32,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Accepts a plain file path, a `sqlite:`-scheme URL or `sqlite::memory:`.
    pub async fn connect(path: &str) -> Result<Self> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(Error::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;
        schema::create_all(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- fixture/stat seeding (owned by the ingest side; used by it and
    // by tests) ----

    pub async fn insert_fixture(&self, fixture: &Fixture) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO fixtures
             (id, league_id, season, home_team_id, away_team_id, home_team, away_team,
              kickoff, status, home_score, away_score, home_odds, draw_odds, away_odds)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(fixture.id)
        .bind(fixture.league_id)
        .bind(fixture.season)
        .bind(fixture.home_team_id)
        .bind(fixture.away_team_id)
        .bind(&fixture.home_team)
        .bind(&fixture.away_team)
        .bind(fixture.kickoff)
        .bind(fixture.status.to_string())
        .bind(fixture.home_score)
        .bind(fixture.away_score)
        .bind(fixture.home_odds.and_then(|d| d.to_f64()))
        .bind(fixture.draw_odds.and_then(|d| d.to_f64()))
        .bind(fixture.away_odds.and_then(|d| d.to_f64()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_team_stat(&self, stat: &TeamComputedStat) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO team_stats
             (team_id, season, goals_avg, conceded_avg, clean_sheet_avg, form_avg, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stat.team_id)
        .bind(stat.season)
        .bind(stat.goals_avg.to_f64())
        .bind(stat.conceded_avg.to_f64())
        .bind(stat.clean_sheet_avg.to_f64())
        .bind(stat.form_avg.to_f64())
        .bind(stat.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_user(&self, id: i64, chat_id: Option<&str>, verified: bool) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO users (id, telegram_chat_id, channel_verified)
             VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(chat_id)
        .bind(verified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- job table (worker side of the queue) ----

    pub async fn claim_pending_jobs(&self, limit: u32) -> Result<Vec<QueuedJob>> {
        let rows = sqlx::query(
            "SELECT id, task, args, attempts FROM jobs
             WHERE status = 'pending' ORDER BY id LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let args: String = row.try_get("args")?;
            jobs.push(QueuedJob {
                id: row.try_get("id")?,
                task: row.try_get("task")?,
                args: serde_json::from_str(&args)?,
                attempts: row.try_get::<i64, _>("attempts")? as u32,
            });
        }
        Ok(jobs)
    }

    pub async fn finish_queue_job(&self, id: i64, ok: bool) -> Result<()> {
        let status = if ok { "done" } else { "failed" };
        sqlx::query("UPDATE jobs SET status = ?, attempts = attempts + 1 WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// List backtest jobs still waiting for pickup.
    pub async fn pending_backtest_jobs(&self, limit: u32) -> Result<Vec<BacktestJob>> {
        let rows = sqlx::query_as::<_, BacktestJobRow>(
            "SELECT * FROM backtest_jobs WHERE status = 'pending' ORDER BY created_at LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BacktestJob::try_from).collect()
    }
}

fn real_to_decimal(v: Option<f64>) -> Option<Decimal> {
    v.and_then(Decimal::from_f64).map(|d| d.round_dp(4))
}

fn decode<T: FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse().map_err(Error::Decode)
}

fn decode_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| Error::Decode(format!("bad decimal `{value}`: {e}")))
}

#[derive(Debug, sqlx::FromRow)]
struct FixtureRow {
    id: i64,
    league_id: i64,
    season: i64,
    home_team_id: i64,
    away_team_id: i64,
    home_team: String,
    away_team: String,
    kickoff: DateTime<Utc>,
    status: String,
    home_score: Option<i64>,
    away_score: Option<i64>,
    home_odds: Option<f64>,
    draw_odds: Option<f64>,
    away_odds: Option<f64>,
}

impl TryFrom<FixtureRow> for Fixture {
    type Error = Error;

    fn try_from(row: FixtureRow) -> Result<Self> {
        Ok(Fixture {
            id: row.id,
            league_id: row.league_id,
            season: row.season as i32,
            home_team_id: row.home_team_id,
            away_team_id: row.away_team_id,
            home_team: row.home_team,
            away_team: row.away_team,
            kickoff: row.kickoff,
            status: decode::<FixtureStatus>(&row.status)?,
            home_score: row.home_score.map(|s| s as i32),
            away_score: row.away_score.map(|s| s as i32),
            home_odds: real_to_decimal(row.home_odds),
            draw_odds: real_to_decimal(row.draw_odds),
            away_odds: real_to_decimal(row.away_odds),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FilterRow {
    id: i64,
    owner_id: i64,
    name: String,
    conditions: String,
    active: bool,
    alerts_enabled: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<FilterRow> for Filter {
    type Error = Error;

    fn try_from(row: FilterRow) -> Result<Self> {
        Ok(Filter {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            conditions: serde_json::from_str(&row.conditions)?,
            active: row.active,
            alerts_enabled: row.alerts_enabled,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FilterMatchRow {
    id: i64,
    filter_id: i64,
    fixture_id: i64,
    matched_at: DateTime<Utc>,
    notification_sent: bool,
    notified_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    bet_result: String,
}

impl TryFrom<FilterMatchRow> for FilterMatch {
    type Error = Error;

    fn try_from(row: FilterMatchRow) -> Result<Self> {
        Ok(FilterMatch {
            id: row.id,
            filter_id: row.filter_id,
            fixture_id: row.fixture_id,
            matched_at: row.matched_at,
            notification_sent: row.notification_sent,
            notified_at: row.notified_at,
            last_error: row.last_error,
            bet_result: decode::<BetResult>(&row.bet_result)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BacktestResultRow {
    filter_id: i64,
    bet_type: String,
    season_key: String,
    total_bets: i64,
    wins: i64,
    losses: i64,
    pushes: i64,
    win_rate: String,
    total_profit: String,
    roi_percentage: String,
    computed_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<BacktestResultRow> for BacktestResult {
    type Error = Error;

    fn try_from(row: BacktestResultRow) -> Result<Self> {
        Ok(BacktestResult {
            filter_id: row.filter_id,
            bet_type: decode::<BetType>(&row.bet_type)?,
            season_key: row.season_key,
            total_bets: row.total_bets as u32,
            wins: row.wins as u32,
            losses: row.losses as u32,
            pushes: row.pushes as u32,
            win_rate: decode_decimal(&row.win_rate)?,
            total_profit: decode_decimal(&row.total_profit)?,
            roi_percentage: decode_decimal(&row.roi_percentage)?,
            computed_at: row.computed_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BacktestJobRow {
    id: String,
    owner_id: i64,
    filter_id: i64,
    bet_type: String,
    seasons: String,
    stake: String,
    status: String,
    progress: i64,
    result: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BacktestJobRow> for BacktestJob {
    type Error = Error;

    fn try_from(row: BacktestJobRow) -> Result<Self> {
        Ok(BacktestJob {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| Error::Decode(format!("bad job id `{}`: {e}", row.id)))?,
            owner_id: row.owner_id,
            filter_id: row.filter_id,
            bet_type: decode::<BetType>(&row.bet_type)?,
            seasons: serde_json::from_str(&row.seasons)?,
            stake: decode_decimal(&row.stake)?,
            status: decode::<JobStatus>(&row.status)?,
            progress: row.progress as u8,
            result: row.result.map(|r| serde_json::from_str(&r)).transpose()?,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl FixtureStore for Database {
    async fn find(&self, query: &FixtureQuery) -> Result<Vec<Fixture>> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT f.* FROM fixtures f");

        for join in query.predicate.joins() {
            builder.push(" LEFT JOIN ");
            builder.push(join.table);
            builder.push(" ");
            builder.push(join.alias);
            builder.push(" ON ");
            builder.push(&join.on);
        }

        builder.push(" WHERE 1 = 1");
        for clause in &query.predicate.clauses {
            builder.push(" AND (");
            push_clause(&mut builder, clause)?;
            builder.push(")");
        }
        if let Some(from) = query.date_from {
            builder.push(" AND f.kickoff >= ").push_bind(from);
        }
        if let Some(to) = query.date_to {
            builder.push(" AND f.kickoff <= ").push_bind(to);
        }
        if let Some(seasons) = &query.seasons {
            builder.push(" AND f.season IN (");
            {
                let mut separated = builder.separated(", ");
                for season in seasons {
                    separated.push_bind(*season);
                }
            }
            builder.push(")");
        }
        if let Some(status) = query.status {
            builder.push(" AND f.status = ").push_bind(status.to_string());
        }
        builder.push(match query.order {
            OrderBy::KickoffAsc => " ORDER BY f.kickoff ASC",
            OrderBy::KickoffDesc => " ORDER BY f.kickoff DESC",
        });
        builder.push(" LIMIT ").push_bind(query.limit as i64);

        let rows: Vec<FixtureRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Fixture::try_from).collect()
    }
}

/// Splice one compiled clause into the query, replacing each `?` placeholder
/// with a real bind in order. A numeric bind that cannot be represented as
/// f64 is an error, never a silently altered predicate.
fn push_clause(
    builder: &mut QueryBuilder<'_, sqlx::Sqlite>,
    clause: &crate::compiler::Clause,
) -> Result<()> {
    let mut parts = clause.expr.split('?');
    if let Some(first) = parts.next() {
        builder.push(first);
    }
    for (part, bind) in parts.zip(clause.binds.iter()) {
        match bind {
            BindValue::Number(n) => {
                let value = n
                    .to_f64()
                    .ok_or_else(|| Error::Validation(format!("numeric bind `{n}` out of range")))?;
                builder.push_bind(value)
            }
            BindValue::Text(s) => builder.push_bind(s.clone()),
        };
        builder.push(part);
    }
    Ok(())
}

#[async_trait]
impl FilterStore for Database {
    async fn create_filter(
        &self,
        owner_id: i64,
        name: &str,
        conditions: &[Condition],
        alerts_enabled: bool,
    ) -> Result<Filter> {
        let errors = crate::rules::validate(conditions);
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::Validation(joined));
        }
        let now = Utc::now();
        let conditions_json = serde_json::to_string(conditions)?;
        let row = sqlx::query(
            "INSERT INTO filters (owner_id, name, conditions, active, alerts_enabled, created_at)
             VALUES (?, ?, ?, 1, ?, ?) RETURNING id",
        )
        .bind(owner_id)
        .bind(name)
        .bind(&conditions_json)
        .bind(alerts_enabled)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(Filter {
            id: row.try_get("id")?,
            owner_id,
            name: name.to_string(),
            conditions: conditions.to_vec(),
            active: true,
            alerts_enabled,
            created_at: now,
        })
    }

    async fn get_filter(&self, id: i64) -> Result<Filter> {
        let row = sqlx::query_as::<_, FilterRow>("SELECT * FROM filters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("filter", id))?;
        Filter::try_from(row)
    }

    async fn list_alert_users(&self) -> Result<Vec<AlertUser>> {
        let rows = sqlx::query(
            "SELECT DISTINCT u.id, u.telegram_chat_id FROM users u
             JOIN filters fl ON fl.owner_id = u.id
             WHERE u.channel_verified = 1
               AND u.telegram_chat_id IS NOT NULL
               AND fl.active = 1 AND fl.alerts_enabled = 1
             ORDER BY u.id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(AlertUser {
                    id: row.try_get("id")?,
                    telegram_chat_id: row.try_get("telegram_chat_id")?,
                })
            })
            .collect()
    }

    async fn active_alert_filters(&self, owner_id: i64) -> Result<Vec<Filter>> {
        let rows = sqlx::query_as::<_, FilterRow>(
            "SELECT * FROM filters
             WHERE owner_id = ? AND active = 1 AND alerts_enabled = 1
             ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Filter::try_from).collect()
    }

    async fn match_exists(&self, filter_id: i64, fixture_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM filter_matches WHERE filter_id = ? AND fixture_id = ?",
        )
        .bind(filter_id)
        .bind(fixture_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn insert_match_if_absent(
        &self,
        filter_id: i64,
        fixture_id: i64,
    ) -> Result<Option<FilterMatch>> {
        let now = Utc::now();
        // INSERT OR IGNORE: a concurrent insert of the same pair loses to the
        // unique index instead of erroring, which is exactly the race-safety
        // the scan needs.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO filter_matches
             (filter_id, fixture_id, matched_at, notification_sent, bet_result)
             VALUES (?, ?, ?, 0, 'pending')",
        )
        .bind(filter_id)
        .bind(fixture_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(FilterMatch {
            id: result.last_insert_rowid(),
            filter_id,
            fixture_id,
            matched_at: now,
            notification_sent: false,
            notified_at: None,
            last_error: None,
            bet_result: BetResult::Pending,
        }))
    }

    async fn get_match(&self, id: i64) -> Result<FilterMatch> {
        let row = sqlx::query_as::<_, FilterMatchRow>("SELECT * FROM filter_matches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("filter match", id))?;
        FilterMatch::try_from(row)
    }

    async fn mark_match_notified(&self, match_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE filter_matches
             SET notification_sent = 1, notified_at = ?, last_error = NULL
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(match_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_match_error(&self, match_id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE filter_matches SET last_error = ? WHERE id = ?")
            .bind(error)
            .bind(match_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_backtest_result(
        &self,
        filter_id: i64,
        bet_type: BetType,
        season_key: &str,
    ) -> Result<Option<BacktestResult>> {
        let row = sqlx::query_as::<_, BacktestResultRow>(
            "SELECT * FROM backtest_results
             WHERE filter_id = ? AND bet_type = ? AND season_key = ?",
        )
        .bind(filter_id)
        .bind(bet_type.to_string())
        .bind(season_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BacktestResult::try_from).transpose()
    }

    async fn replace_backtest_result(&self, result: &BacktestResult) -> Result<()> {
        sqlx::query(
            "DELETE FROM backtest_results
             WHERE filter_id = ? AND bet_type = ? AND season_key = ?",
        )
        .bind(result.filter_id)
        .bind(result.bet_type.to_string())
        .bind(&result.season_key)
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "INSERT INTO backtest_results
             (filter_id, bet_type, season_key, total_bets, wins, losses, pushes,
              win_rate, total_profit, roi_percentage, computed_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(result.filter_id)
        .bind(result.bet_type.to_string())
        .bind(&result.season_key)
        .bind(result.total_bets as i64)
        .bind(result.wins as i64)
        .bind(result.losses as i64)
        .bind(result.pushes as i64)
        .bind(result.win_rate.to_string())
        .bind(result.total_profit.to_string())
        .bind(result.roi_percentage.to_string())
        .bind(result.computed_at)
        .bind(result.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_backtest_job(&self, job: &BacktestJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO backtest_jobs
             (id, owner_id, filter_id, bet_type, seasons, stake, status, progress,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(job.owner_id)
        .bind(job.filter_id)
        .bind(job.bet_type.to_string())
        .bind(serde_json::to_string(&job.seasons)?)
        .bind(job.stake.to_string())
        .bind(job.status.to_string())
        .bind(job.progress as i64)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_backtest_job(&self, id: Uuid) -> Result<BacktestJob> {
        let row = sqlx::query_as::<_, BacktestJobRow>("SELECT * FROM backtest_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("backtest job", id))?;
        BacktestJob::try_from(row)
    }

    async fn transition_job(&self, id: Uuid, status: JobStatus, progress: u8) -> Result<()> {
        let current = self.get_backtest_job(id).await?;
        if current.status != status && !current.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }
        sqlx::query(
            "UPDATE backtest_jobs SET status = ?, progress = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(progress as i64)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, result: &serde_json::Value) -> Result<()> {
        self.transition_job(id, JobStatus::Completed, 100).await?;
        sqlx::query("UPDATE backtest_jobs SET result = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(result)?)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<()> {
        self.transition_job(id, JobStatus::Failed, 100).await?;
        sqlx::query("UPDATE backtest_jobs SET error = ?, updated_at = ? WHERE id = ?")
            .bind(error)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancel_job(&self, id: Uuid) -> Result<()> {
        // Only prevents a future pickup; a running computation is not
        // interrupted.
        let current = self.get_backtest_job(id).await?;
        if !current.status.can_transition_to(JobStatus::Cancelled) {
            return Err(Error::InvalidTransition {
                from: current.status.to_string(),
                to: JobStatus::Cancelled.to_string(),
            });
        }
        sqlx::query("UPDATE backtest_jobs SET status = 'cancelled', updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for Database {
    async fn enqueue(&self, task: &str, args: serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (task, args, status, attempts, created_at)
             VALUES (?, ?, 'pending', 0, ?)",
        )
        .bind(task)
        .bind(serde_json::to_string(&args)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
