//! Live rule evaluator
//!
//! Checks a rule list against one in-memory snapshot of a match in play.
//! Rules are a closed, tagged union with one case per category; anything the
//! deserializer does not recognize lands in [`LiveRule::Unknown`] and
//! evaluates to false. Fail closed, never fail open: a rule that cannot be
//! resolved (missing stat, missing odds entry, unsupported target) is false,
//! it is never an error.

#[cfg(test)]
mod tests;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-stat counters as tracked by the live feed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatCounter {
    pub home: Decimal,
    pub away: Decimal,
    pub total: Decimal,
}

/// One priced selection inside a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsQuote {
    pub selection: String,
    #[serde(default)]
    pub line: Option<Decimal>,
    pub price: Decimal,
}

/// Snapshot of one live match, assembled by the feed collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub fixture_id: i64,
    pub minute: u32,
    pub home_score: u32,
    pub away_score: u32,
    /// Stat name (corners, shots_on_target, ...) to counters.
    #[serde(default)]
    pub stats: HashMap<String, StatCounter>,
    /// Market name to its priced selections.
    #[serde(default)]
    pub odds: HashMap<String, Vec<OddsQuote>>,
    #[serde(default)]
    pub ai_home_win_prob: Option<Decimal>,
    #[serde(default)]
    pub ai_away_win_prob: Option<Decimal>,
    #[serde(default)]
    pub historical_home_win_pct: Option<Decimal>,
    #[serde(default)]
    pub historical_away_win_pct: Option<Decimal>,
}

impl LiveSnapshot {
    /// Side currently winning, if any.
    fn winning_side(&self) -> Option<Side> {
        match self.home_score.cmp(&self.away_score) {
            std::cmp::Ordering::Greater => Some(Side::Home),
            std::cmp::Ordering::Less => Some(Side::Away),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn losing_side(&self) -> Option<Side> {
        self.winning_side().map(Side::other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Home,
    Away,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

/// Where a stat-based rule reads its value from. WINNING/LOSING resolve
/// dynamically to whichever side currently holds that state and make the
/// rule false while the match is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatTarget {
    Home,
    Away,
    #[serde(alias = "EITHER", alias = "MATCH")]
    Total,
    Winning,
    Losing,
}

/// Side a team-state rule is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateTarget {
    Home,
    Away,
    /// OR across both sides.
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequiredState {
    Winning,
    Losing,
    Drawing,
    NotWinning,
    NotLosing,
}

/// Numeric comparator used by the value-bearing rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparator {
    pub fn apply(self, left: Decimal, right: Decimal) -> bool {
        match self {
            Comparator::Gt => left > right,
            Comparator::Gte => left >= right,
            Comparator::Lt => left < right,
            Comparator::Lte => left <= right,
            Comparator::Eq => left == right,
            Comparator::Ne => left != right,
        }
    }
}

/// Pre-match probability metric usable in live rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreMatchMetric {
    AiWinProbability,
    HistoricalWinPct,
}

/// One live rule. The `category` tag keeps the set closed; unrecognized
/// categories deserialize into `Unknown` and evaluate false.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum LiveRule {
    /// Compare a live stat against a fixed value, or against the same stat
    /// on another target when `compare_to` is set and `value` is absent.
    LiveStats {
        metric: String,
        target: StatTarget,
        comparator: Comparator,
        #[serde(default)]
        value: Option<Decimal>,
        #[serde(default)]
        compare_to: Option<StatTarget>,
    },
    TeamState {
        state: RequiredState,
        target: StateTarget,
    },
    Odds {
        market: String,
        selection: String,
        #[serde(default)]
        line: Option<Decimal>,
        comparator: Comparator,
        value: Decimal,
    },
    /// Exact-minute check when `minute` is set, otherwise a conjunction of
    /// the before/after bounds that are present.
    Timing {
        #[serde(default)]
        minute: Option<u32>,
        #[serde(default)]
        before_minute: Option<u32>,
        #[serde(default)]
        after_minute: Option<u32>,
    },
    PreMatchStats {
        metric: PreMatchMetric,
        target: StatTarget,
        comparator: Comparator,
        value: Decimal,
    },
    #[serde(other)]
    Unknown,
}

/// Logical AND of all rules against the snapshot, short-circuiting on the
/// first false.
pub fn evaluate_match(snapshot: &LiveSnapshot, rules: &[LiveRule]) -> bool {
    rules.iter().all(|rule| evaluate_rule(snapshot, rule))
}

fn evaluate_rule(snapshot: &LiveSnapshot, rule: &LiveRule) -> bool {
    match rule {
        LiveRule::LiveStats {
            metric,
            target,
            comparator,
            value,
            compare_to,
        } => evaluate_live_stats(snapshot, metric, *target, *comparator, *value, *compare_to),
        LiveRule::TeamState { state, target } => evaluate_team_state(snapshot, *state, *target),
        LiveRule::Odds {
            market,
            selection,
            line,
            comparator,
            value,
        } => evaluate_odds(snapshot, market, selection, *line, *comparator, *value),
        LiveRule::Timing {
            minute,
            before_minute,
            after_minute,
        } => evaluate_timing(snapshot.minute, *minute, *before_minute, *after_minute),
        LiveRule::PreMatchStats {
            metric,
            target,
            comparator,
            value,
        } => evaluate_pre_match(snapshot, *metric, *target, *comparator, *value),
        LiveRule::Unknown => false,
    }
}

/// Resolve a stat for a target. None when the stat is untracked or the
/// dynamic target does not currently exist.
fn resolve_stat(snapshot: &LiveSnapshot, metric: &str, target: StatTarget) -> Option<Decimal> {
    let counter = snapshot.stats.get(metric)?;
    match target {
        StatTarget::Home => Some(counter.home),
        StatTarget::Away => Some(counter.away),
        StatTarget::Total => Some(counter.total),
        StatTarget::Winning => match snapshot.winning_side()? {
            Side::Home => Some(counter.home),
            Side::Away => Some(counter.away),
        },
        StatTarget::Losing => match snapshot.losing_side()? {
            Side::Home => Some(counter.home),
            Side::Away => Some(counter.away),
        },
    }
}

fn evaluate_live_stats(
    snapshot: &LiveSnapshot,
    metric: &str,
    target: StatTarget,
    comparator: Comparator,
    value: Option<Decimal>,
    compare_to: Option<StatTarget>,
) -> bool {
    let Some(left) = resolve_stat(snapshot, metric, target) else {
        return false;
    };
    let right = match (value, compare_to) {
        // Fixed value wins when both are present.
        (Some(v), _) => v,
        (None, Some(other)) => match resolve_stat(snapshot, metric, other) {
            Some(v) => v,
            None => return false,
        },
        (None, None) => return false,
    };
    comparator.apply(left, right)
}

fn side_state(snapshot: &LiveSnapshot, side: Side) -> RequiredState {
    match snapshot.winning_side() {
        Some(w) if w == side => RequiredState::Winning,
        Some(_) => RequiredState::Losing,
        None => RequiredState::Drawing,
    }
}

fn state_matches(actual: RequiredState, required: RequiredState) -> bool {
    match required {
        RequiredState::NotWinning => actual != RequiredState::Winning,
        RequiredState::NotLosing => actual != RequiredState::Losing,
        exact => actual == exact,
    }
}

fn evaluate_team_state(
    snapshot: &LiveSnapshot,
    state: RequiredState,
    target: StateTarget,
) -> bool {
    match target {
        StateTarget::Home => state_matches(side_state(snapshot, Side::Home), state),
        StateTarget::Away => state_matches(side_state(snapshot, Side::Away), state),
        StateTarget::Either => {
            state_matches(side_state(snapshot, Side::Home), state)
                || state_matches(side_state(snapshot, Side::Away), state)
        }
    }
}

fn evaluate_odds(
    snapshot: &LiveSnapshot,
    market: &str,
    selection: &str,
    line: Option<Decimal>,
    comparator: Comparator,
    value: Decimal,
) -> bool {
    let Some(quotes) = snapshot.odds.get(market) else {
        return false;
    };
    quotes
        .iter()
        .find(|q| q.selection == selection && q.line == line)
        .map(|q| comparator.apply(q.price, value))
        .unwrap_or(false)
}

fn evaluate_timing(
    current: u32,
    minute: Option<u32>,
    before: Option<u32>,
    after: Option<u32>,
) -> bool {
    if let Some(m) = minute {
        return current == m;
    }
    if before.is_none() && after.is_none() {
        return false;
    }
    let before_ok = before.map(|b| current < b).unwrap_or(true);
    let after_ok = after.map(|a| current > a).unwrap_or(true);
    before_ok && after_ok
}

fn evaluate_pre_match(
    snapshot: &LiveSnapshot,
    metric: PreMatchMetric,
    target: StatTarget,
    comparator: Comparator,
    value: Decimal,
) -> bool {
    // Only per-side probabilities exist; any other (metric, target) pair is
    // unsupported and false.
    let resolved = match (metric, target) {
        (PreMatchMetric::AiWinProbability, StatTarget::Home) => snapshot.ai_home_win_prob,
        (PreMatchMetric::AiWinProbability, StatTarget::Away) => snapshot.ai_away_win_prob,
        (PreMatchMetric::HistoricalWinPct, StatTarget::Home) => snapshot.historical_home_win_pct,
        (PreMatchMetric::HistoricalWinPct, StatTarget::Away) => snapshot.historical_away_win_pct,
        _ => None,
    };
    resolved.map(|v| comparator.apply(v, value)).unwrap_or(false)
}
