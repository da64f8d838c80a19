//! Pre-match rule compiler
//!
//! Turns a validated rule set into an explicit query predicate the fixture
//! store renders to SQL: direct fields map 1:1 to fixture columns, aggregate
//! fields resolve through two independent LEFT JOIN aliases onto the
//! team_stats table (home side and away side), and `total_expected_goals` is
//! the sum of both sides' scoring averages. Fixtures without computed stats
//! simply fail aggregate conditions (NULL comparison), they never error.
//!
//! A narrower [`evaluate`] checks a rule set against one fixture in memory.
//! It is a strict subset: direct fixture fields only. Callers that need the
//! joined aggregates must go through [`find_matches`].


use crate::error::{Error, Result};
use crate::rules::{resolve_field, FieldKind};
use crate::types::{Condition, ConditionValue, Fixture, FixtureStatus, Operator};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Join alias for the home side's computed stats.
pub const HOME_STATS_ALIAS: &str = "hstats";
/// Join alias for the away side's computed stats.
pub const AWAY_STATS_ALIAS: &str = "astats";

/// Value bound into a rendered SQL clause.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Number(Decimal),
    Text(String),
}

impl From<&ConditionValue> for BindValue {
    fn from(value: &ConditionValue) -> Self {
        match value {
            ConditionValue::Number(n) => BindValue::Number(*n),
            ConditionValue::Text(s) => BindValue::Text(s.clone()),
            // Lists never reach here; validation and compile_condition
            // unpack them per element.
            ConditionValue::List(_) => BindValue::Text(String::new()),
        }
    }
}

/// One rendered WHERE clause: a SQL expression with `?` placeholders plus
/// its bind values, ANDed with the others.
#[derive(Debug, Clone)]
pub struct Clause {
    pub expr: String,
    pub binds: Vec<BindValue>,
}

/// Explicit join specification handed to the store's renderer, instead of
/// leaving alias management to an ORM.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub table: &'static str,
    pub alias: &'static str,
    pub on: String,
}

/// Compiled form of a rule set.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    pub clauses: Vec<Clause>,
    needs_home_stats: bool,
    needs_away_stats: bool,
}

impl Predicate {
    /// LEFT JOINs the store must add before the WHERE clauses resolve.
    /// Empty for filters over direct fields only.
    pub fn joins(&self) -> Vec<JoinSpec> {
        let mut joins = Vec::new();
        if self.needs_home_stats {
            joins.push(JoinSpec {
                table: "team_stats",
                alias: HOME_STATS_ALIAS,
                on: format!(
                    "{HOME_STATS_ALIAS}.team_id = f.home_team_id AND {HOME_STATS_ALIAS}.season = f.season"
                ),
            });
        }
        if self.needs_away_stats {
            joins.push(JoinSpec {
                table: "team_stats",
                alias: AWAY_STATS_ALIAS,
                on: format!(
                    "{AWAY_STATS_ALIAS}.team_id = f.away_team_id AND {AWAY_STATS_ALIAS}.season = f.season"
                ),
            });
        }
        joins
    }
}

/// Result ordering for a fixture query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    /// Scans want the soonest kickoff first.
    KickoffAsc,
    /// Caller default elsewhere: most recent first.
    #[default]
    KickoffDesc,
}

/// Full query handed to the fixture store: compiled predicate plus the
/// bounds the engines layer on top.
#[derive(Debug, Clone)]
pub struct FixtureQuery {
    pub predicate: Predicate,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub seasons: Option<Vec<i32>>,
    /// Restrict to one lifecycle status. Backtests settle only finished
    /// fixtures; scans alert only on fixtures still scheduled to be played,
    /// never cancelled or postponed ones.
    pub status: Option<FixtureStatus>,
    pub order: OrderBy,
    pub limit: u32,
}

impl FixtureQuery {
    pub fn new(predicate: Predicate, limit: u32) -> Self {
        Self {
            predicate,
            date_from: None,
            date_to: None,
            seasons: None,
            status: None,
            order: OrderBy::default(),
            limit,
        }
    }
}

/// Read/query seam onto stored fixtures; the SQLite implementation lives
/// in `storage`.
#[async_trait]
pub trait FixtureStore: Send + Sync {
    async fn find(&self, query: &FixtureQuery) -> Result<Vec<Fixture>>;
}

/// Compile a validated rule set into a predicate. A pre-pass over the fields
/// decides which stat joins are needed so simple filters skip them entirely.
pub fn compile(conditions: &[Condition]) -> Result<Predicate> {
    let mut predicate = Predicate::default();

    // Join pre-pass.
    for cond in conditions {
        match resolve_field(&cond.field) {
            Some(FieldKind::HomeAggregate(_)) => predicate.needs_home_stats = true,
            Some(FieldKind::AwayAggregate(_)) => predicate.needs_away_stats = true,
            Some(FieldKind::TotalExpectedGoals) => {
                predicate.needs_home_stats = true;
                predicate.needs_away_stats = true;
            }
            Some(FieldKind::Direct(_)) => {}
            None => {
                return Err(Error::Validation(format!(
                    "cannot compile unknown field `{}`",
                    cond.field
                )))
            }
        }
    }

    for cond in conditions {
        predicate.clauses.push(compile_condition(cond)?);
    }

    Ok(predicate)
}

fn column_expr(kind: FieldKind) -> String {
    match kind {
        FieldKind::Direct(col) => format!("f.{col}"),
        FieldKind::HomeAggregate(col) => format!("{HOME_STATS_ALIAS}.{col}"),
        FieldKind::AwayAggregate(col) => format!("{AWAY_STATS_ALIAS}.{col}"),
        FieldKind::TotalExpectedGoals => {
            format!("({HOME_STATS_ALIAS}.goals_avg + {AWAY_STATS_ALIAS}.goals_avg)")
        }
    }
}

fn compile_condition(cond: &Condition) -> Result<Clause> {
    let kind = resolve_field(&cond.field)
        .ok_or_else(|| Error::Validation(format!("unknown field `{}`", cond.field)))?;
    let expr = column_expr(kind);

    let clause = match cond.operator {
        Operator::In => {
            let items = cond.value.as_list().ok_or_else(|| {
                Error::Validation(format!("`in` on `{}` requires a list", cond.field))
            })?;
            let placeholders = vec!["?"; items.len()].join(", ");
            Clause {
                expr: format!("{expr} IN ({placeholders})"),
                binds: items.iter().map(BindValue::from).collect(),
            }
        }
        Operator::Between => {
            let items = cond.value.as_list().filter(|l| l.len() == 2).ok_or_else(|| {
                Error::Validation(format!(
                    "`between` on `{}` requires a 2-element list",
                    cond.field
                ))
            })?;
            Clause {
                expr: format!("{expr} BETWEEN ? AND ?"),
                binds: items.iter().map(BindValue::from).collect(),
            }
        }
        op => {
            if matches!(cond.value, ConditionValue::List(_)) {
                return Err(Error::Validation(format!(
                    "operator `{op}` on `{}` requires a scalar",
                    cond.field
                )));
            }
            let sql_op = match op {
                Operator::Eq => "=",
                Operator::Ne => "!=",
                Operator::Gt => ">",
                Operator::Lt => "<",
                Operator::Gte => ">=",
                Operator::Lte => "<=",
                Operator::In | Operator::Between => unreachable!(),
            };
            Clause {
                expr: format!("{expr} {sql_op} ?"),
                binds: vec![BindValue::from(&cond.value)],
            }
        }
    };

    Ok(clause)
}

/// Compile and run a rule set against the store with optional date bounds,
/// an optional status restriction and a result cap.
pub async fn find_matches(
    store: &dyn FixtureStore,
    conditions: &[Condition],
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    status: Option<FixtureStatus>,
    limit: u32,
    order: OrderBy,
) -> Result<Vec<Fixture>> {
    let mut query = FixtureQuery::new(compile(conditions)?, limit);
    query.date_from = date_from;
    query.date_to = date_to;
    query.status = status;
    query.order = order;
    store.find(&query).await
}

/// In-memory check of a rule set against one fixture. Strict subset of the
/// compiled path: aggregate fields and `total_expected_goals` are an error
/// here because they need the stats join.
pub fn evaluate(conditions: &[Condition], fixture: &Fixture) -> Result<bool> {
    for cond in conditions {
        let kind = resolve_field(&cond.field)
            .ok_or_else(|| Error::Validation(format!("unknown field `{}`", cond.field)))?;
        let col = match kind {
            FieldKind::Direct(col) => col,
            _ => return Err(Error::UnsupportedField(cond.field.clone())),
        };
        let Some(actual) = direct_value(fixture, col) else {
            // Null column (e.g. missing odds) fails the condition, matching
            // the SQL NULL-comparison behavior of the compiled path.
            return Ok(false);
        };
        if !compare(actual, cond.operator, &cond.value) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn direct_value(fixture: &Fixture, column: &str) -> Option<Decimal> {
    match column {
        "league_id" => Some(Decimal::from(fixture.league_id)),
        "season" => Some(Decimal::from(fixture.season)),
        "home_team_id" => Some(Decimal::from(fixture.home_team_id)),
        "away_team_id" => Some(Decimal::from(fixture.away_team_id)),
        "home_odds" => fixture.home_odds,
        "draw_odds" => fixture.draw_odds,
        "away_odds" => fixture.away_odds,
        _ => None,
    }
}

fn compare(actual: Decimal, operator: Operator, value: &ConditionValue) -> bool {
    match operator {
        Operator::In => value
            .as_list()
            .map(|items| items.iter().any(|v| v.as_number() == Some(actual)))
            .unwrap_or(false),
        Operator::Between => value
            .as_list()
            .filter(|l| l.len() == 2)
            .and_then(|l| Some((l[0].as_number()?, l[1].as_number()?)))
            .map(|(lo, hi)| actual >= lo && actual <= hi)
            .unwrap_or(false),
        op => {
            let Some(expected) = value.as_number() else {
                return false;
            };
            match op {
                Operator::Eq => actual == expected,
                Operator::Ne => actual != expected,
                Operator::Gt => actual > expected,
                Operator::Lt => actual < expected,
                Operator::Gte => actual >= expected,
                Operator::Lte => actual <= expected,
                Operator::In | Operator::Between => unreachable!(),
            }
        }
    }
}
