//! Extended backtest analytics
//!
//! All functions take the chronological bet sequence produced by the engine.
//! Pushes are transparent everywhere: they break no streak and stake no
//! money, they only appear in the monthly counts.

use crate::types::BetResult;
use chrono::Datelike;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::SimulatedBet;

/// Profit-curve length cap; longer runs are downsampled by a fixed stride.
pub const MAX_CURVE_POINTS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub streaks: Streaks,
    pub monthly: Vec<MonthlyRow>,
    pub drawdown: Drawdown,
    pub profit_curve: Vec<CurvePoint>,
    /// Fractional Kelly stake suggested by the realized edge, 0 when the
    /// edge is non-positive.
    pub kelly_fraction: Decimal,
    pub win_rate_ci: ConfidenceInterval,
}

/// Win/loss streaks. `current` is signed by the most recent non-push run:
/// positive for wins, negative for losses, 0 when nothing has decided yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    pub current: i32,
    pub longest_win: u32,
    pub longest_loss: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRow {
    /// `YYYY-MM` of the fixture month.
    pub month: String,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub profit: Decimal,
    pub win_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    pub peak_balance: Decimal,
    pub max_drawdown: Decimal,
    /// Max drawdown as a percentage of the peak at the time, 0 when the
    /// balance never rose above 0.
    pub max_drawdown_pct: Decimal,
    pub current_drawdown: Decimal,
    pub current_drawdown_pct: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Sequential match index the cumulative value belongs to.
    pub index: u32,
    pub cumulative_profit: Decimal,
}

/// 95% interval on the win rate, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: Decimal,
    pub upper: Decimal,
}

pub fn compute(bets: &[SimulatedBet]) -> Analytics {
    Analytics {
        streaks: streaks(bets),
        monthly: monthly(bets),
        drawdown: drawdown(bets),
        profit_curve: profit_curve(bets),
        kelly_fraction: kelly_fraction(bets),
        win_rate_ci: win_rate_ci(bets),
    }
}

pub fn streaks(bets: &[SimulatedBet]) -> Streaks {
    let mut longest_win = 0u32;
    let mut longest_loss = 0u32;
    let mut run = 0i32; // positive while winning, negative while losing

    for bet in bets {
        match bet.result {
            BetResult::Win => {
                run = if run > 0 { run + 1 } else { 1 };
                longest_win = longest_win.max(run as u32);
            }
            BetResult::Loss => {
                run = if run < 0 { run - 1 } else { -1 };
                longest_loss = longest_loss.max(run.unsigned_abs());
            }
            // Pushes neither extend nor break the run.
            BetResult::Push | BetResult::Pending => {}
        }
    }

    Streaks {
        current: run,
        longest_win,
        longest_loss,
    }
}

pub fn monthly(bets: &[SimulatedBet]) -> Vec<MonthlyRow> {
    let mut rows: Vec<MonthlyRow> = Vec::new();

    for bet in bets {
        let month = format!("{:04}-{:02}", bet.kickoff.year(), bet.kickoff.month());
        let idx = match rows.iter().position(|r| r.month == month) {
            Some(idx) => idx,
            None => {
                rows.push(MonthlyRow {
                    month,
                    wins: 0,
                    losses: 0,
                    pushes: 0,
                    profit: Decimal::ZERO,
                    win_rate: Decimal::ZERO,
                });
                rows.len() - 1
            }
        };
        let row = &mut rows[idx];
        match bet.result {
            BetResult::Win => row.wins += 1,
            BetResult::Loss => row.losses += 1,
            BetResult::Push | BetResult::Pending => row.pushes += 1,
        }
        row.profit += bet.profit;
    }

    for row in &mut rows {
        let decided = row.wins + row.losses;
        if decided > 0 {
            row.win_rate =
                (Decimal::from(row.wins) / Decimal::from(decided) * dec!(100)).round_dp(2);
        }
    }
    rows.sort_by(|a, b| a.month.cmp(&b.month));
    rows
}

pub fn drawdown(bets: &[SimulatedBet]) -> Drawdown {
    let mut balance = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut max_dd = Decimal::ZERO;
    let mut max_dd_pct = Decimal::ZERO;

    for bet in bets {
        balance += bet.profit;
        peak = peak.max(balance);
        let dd = peak - balance;
        if dd > max_dd {
            max_dd = dd;
            max_dd_pct = pct_of(dd, peak);
        }
    }

    let current = peak - balance;
    Drawdown {
        peak_balance: peak,
        max_drawdown: max_dd,
        max_drawdown_pct: max_dd_pct,
        current_drawdown: current,
        current_drawdown_pct: pct_of(current, peak),
    }
}

fn pct_of(value: Decimal, base: Decimal) -> Decimal {
    if base <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        (value / base * dec!(100)).round_dp(2)
    }
}

pub fn profit_curve(bets: &[SimulatedBet]) -> Vec<CurvePoint> {
    let mut cumulative = Decimal::ZERO;
    let full: Vec<CurvePoint> = bets
        .iter()
        .enumerate()
        .map(|(i, bet)| {
            cumulative += bet.profit;
            CurvePoint {
                index: i as u32,
                cumulative_profit: cumulative,
            }
        })
        .collect();

    if full.len() <= MAX_CURVE_POINTS {
        return full;
    }
    let stride = full.len().div_ceil(MAX_CURVE_POINTS);
    full.into_iter().step_by(stride).collect()
}

/// Full Kelly for even-sequence betting: f* = (b·p − q) / b, with p the
/// realized win rate, q = 1 − p, and b the average net odds of the decided
/// bets. Negative edges clamp to zero.
pub fn kelly_fraction(bets: &[SimulatedBet]) -> Decimal {
    let decided: Vec<&SimulatedBet> = bets
        .iter()
        .filter(|b| matches!(b.result, BetResult::Win | BetResult::Loss))
        .collect();
    if decided.is_empty() {
        return Decimal::ZERO;
    }

    let n = Decimal::from(decided.len());
    let wins = decided
        .iter()
        .filter(|b| b.result == BetResult::Win)
        .count();
    let p = Decimal::from(wins) / n;
    let q = Decimal::ONE - p;
    let avg_odds: Decimal = decided.iter().map(|b| b.odds).sum::<Decimal>() / n;
    let b = avg_odds - Decimal::ONE;
    if b <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let kelly = (b * p - q) / b;
    kelly.max(Decimal::ZERO).round_dp(4)
}

/// 95% normal-approximation interval on the win rate, clamped to [0, 100].
pub fn win_rate_ci(bets: &[SimulatedBet]) -> ConfidenceInterval {
    let wins = bets.iter().filter(|b| b.result == BetResult::Win).count();
    let losses = bets.iter().filter(|b| b.result == BetResult::Loss).count();
    let n = wins + losses;
    if n == 0 {
        return ConfidenceInterval {
            lower: Decimal::ZERO,
            upper: Decimal::ZERO,
        };
    }

    let n_dec = Decimal::from(n);
    let p = Decimal::from(wins) / n_dec;
    let variance = p * (Decimal::ONE - p) / n_dec;
    let half = dec!(1.96) * variance.sqrt().unwrap_or(Decimal::ZERO);

    ConfidenceInterval {
        lower: ((p - half).max(Decimal::ZERO) * dec!(100)).round_dp(2),
        upper: ((p + half).min(Decimal::ONE) * dec!(100)).round_dp(2),
    }
}
