//! Tests for the live rule evaluator

use super::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn snapshot() -> LiveSnapshot {
    let mut stats = HashMap::new();
    stats.insert(
        "corners".to_string(),
        StatCounter {
            home: dec!(6),
            away: dec!(2),
            total: dec!(8),
        },
    );
    stats.insert(
        "shots_on_target".to_string(),
        StatCounter {
            home: dec!(3),
            away: dec!(5),
            total: dec!(8),
        },
    );
    let mut odds = HashMap::new();
    odds.insert(
        "over_under".to_string(),
        vec![
            OddsQuote {
                selection: "over".to_string(),
                line: Some(dec!(2.5)),
                price: dec!(1.70),
            },
            OddsQuote {
                selection: "under".to_string(),
                line: Some(dec!(2.5)),
                price: dec!(2.10),
            },
        ],
    );
    LiveSnapshot {
        fixture_id: 1,
        minute: 63,
        home_score: 1,
        away_score: 0,
        stats,
        odds,
        ai_home_win_prob: Some(dec!(0.55)),
        ai_away_win_prob: Some(dec!(0.20)),
        historical_home_win_pct: Some(dec!(48)),
        historical_away_win_pct: Some(dec!(22)),
    }
}

fn stat_rule(metric: &str, target: StatTarget, comparator: Comparator, value: Decimal) -> LiveRule {
    LiveRule::LiveStats {
        metric: metric.to_string(),
        target,
        comparator,
        value: Some(value),
        compare_to: None,
    }
}

#[test]
fn test_live_stats_fixed_value() {
    let s = snapshot();
    assert!(evaluate_match(
        &s,
        &[stat_rule("corners", StatTarget::Home, Comparator::Gte, dec!(5))]
    ));
    assert!(!evaluate_match(
        &s,
        &[stat_rule("corners", StatTarget::Away, Comparator::Gt, dec!(4))]
    ));
    assert!(evaluate_match(
        &s,
        &[stat_rule("corners", StatTarget::Total, Comparator::Eq, dec!(8))]
    ));
}

#[test]
fn test_live_stats_cross_team_compare() {
    let s = snapshot();
    // Home corners > away corners.
    let rule = LiveRule::LiveStats {
        metric: "corners".to_string(),
        target: StatTarget::Home,
        comparator: Comparator::Gt,
        value: None,
        compare_to: Some(StatTarget::Away),
    };
    assert!(evaluate_match(&s, &[rule]));

    let rule = LiveRule::LiveStats {
        metric: "shots_on_target".to_string(),
        target: StatTarget::Home,
        comparator: Comparator::Gt,
        value: None,
        compare_to: Some(StatTarget::Away),
    };
    assert!(!evaluate_match(&s, &[rule]));
}

#[test]
fn test_live_stats_winning_target_resolves_dynamically() {
    let s = snapshot(); // home leads 1-0
    assert!(evaluate_match(
        &s,
        &[stat_rule("corners", StatTarget::Winning, Comparator::Eq, dec!(6))]
    ));
    assert!(evaluate_match(
        &s,
        &[stat_rule("corners", StatTarget::Losing, Comparator::Eq, dec!(2))]
    ));
}

#[test]
fn test_live_stats_dynamic_target_false_when_drawn() {
    let mut s = snapshot();
    s.away_score = 1;
    assert!(!evaluate_match(
        &s,
        &[stat_rule("corners", StatTarget::Winning, Comparator::Gte, dec!(0))]
    ));
}

#[test]
fn test_live_stats_untracked_metric_is_false() {
    let s = snapshot();
    assert!(!evaluate_match(
        &s,
        &[stat_rule("offsides", StatTarget::Home, Comparator::Gte, dec!(0))]
    ));
}

#[test]
fn test_live_stats_no_value_no_compare_to_is_false() {
    let s = snapshot();
    let rule = LiveRule::LiveStats {
        metric: "corners".to_string(),
        target: StatTarget::Home,
        comparator: Comparator::Gt,
        value: None,
        compare_to: None,
    };
    assert!(!evaluate_match(&s, &[rule]));
}

#[test]
fn test_team_state() {
    let s = snapshot(); // home 1-0
    let winning_home = LiveRule::TeamState {
        state: RequiredState::Winning,
        target: StateTarget::Home,
    };
    assert!(evaluate_match(&s, &[winning_home]));

    let not_losing_away = LiveRule::TeamState {
        state: RequiredState::NotLosing,
        target: StateTarget::Away,
    };
    assert!(!evaluate_match(&s, &[not_losing_away]));

    let either_winning = LiveRule::TeamState {
        state: RequiredState::Winning,
        target: StateTarget::Either,
    };
    assert!(evaluate_match(&s, &[either_winning]));
}

#[test]
fn test_team_state_drawing() {
    let mut s = snapshot();
    s.away_score = 1;
    let drawing = LiveRule::TeamState {
        state: RequiredState::Drawing,
        target: StateTarget::Home,
    };
    assert!(evaluate_match(&s, &[drawing]));
    let not_winning = LiveRule::TeamState {
        state: RequiredState::NotWinning,
        target: StateTarget::Either,
    };
    assert!(evaluate_match(&s, &[not_winning]));
}

#[test]
fn test_odds_lookup() {
    let s = snapshot();
    let rule = LiveRule::Odds {
        market: "over_under".to_string(),
        selection: "over".to_string(),
        line: Some(dec!(2.5)),
        comparator: Comparator::Lte,
        value: dec!(1.80),
    };
    assert!(evaluate_match(&s, &[rule]));
}

#[test]
fn test_odds_missing_market_or_line_is_false() {
    let s = snapshot();
    let missing_market = LiveRule::Odds {
        market: "btts".to_string(),
        selection: "yes".to_string(),
        line: None,
        comparator: Comparator::Gt,
        value: dec!(1),
    };
    assert!(!evaluate_match(&s, &[missing_market]));

    let wrong_line = LiveRule::Odds {
        market: "over_under".to_string(),
        selection: "over".to_string(),
        line: Some(dec!(3.5)),
        comparator: Comparator::Gt,
        value: dec!(1),
    };
    assert!(!evaluate_match(&s, &[wrong_line]));
}

#[test]
fn test_timing_exact_minute() {
    let s = snapshot(); // minute 63
    let rule = LiveRule::Timing {
        minute: Some(63),
        before_minute: None,
        after_minute: None,
    };
    assert!(evaluate_match(&s, &[rule]));
}

#[test]
fn test_timing_bounds() {
    let s = snapshot();
    let window = LiveRule::Timing {
        minute: None,
        before_minute: Some(75),
        after_minute: Some(60),
    };
    assert!(evaluate_match(&s, &[window]));

    let too_early = LiveRule::Timing {
        minute: None,
        before_minute: None,
        after_minute: Some(70),
    };
    assert!(!evaluate_match(&s, &[too_early]));

    let empty = LiveRule::Timing {
        minute: None,
        before_minute: None,
        after_minute: None,
    };
    assert!(!evaluate_match(&s, &[empty]));
}

#[test]
fn test_pre_match_stats() {
    let s = snapshot();
    let rule = LiveRule::PreMatchStats {
        metric: PreMatchMetric::AiWinProbability,
        target: StatTarget::Home,
        comparator: Comparator::Gte,
        value: dec!(0.50),
    };
    assert!(evaluate_match(&s, &[rule]));

    // Unsupported (metric, target) pair.
    let unsupported = LiveRule::PreMatchStats {
        metric: PreMatchMetric::HistoricalWinPct,
        target: StatTarget::Total,
        comparator: Comparator::Gt,
        value: dec!(0),
    };
    assert!(!evaluate_match(&s, &[unsupported]));
}

#[test]
fn test_unknown_category_fails_closed() {
    let s = snapshot();
    let rule: LiveRule =
        serde_json::from_str(r#"{"category": "astrology", "sign": "leo"}"#).unwrap();
    assert!(matches!(rule, LiveRule::Unknown));
    assert!(!evaluate_match(&s, &[rule]));
}

#[test]
fn test_and_short_circuits() {
    let s = snapshot();
    let passing = stat_rule("corners", StatTarget::Home, Comparator::Gte, dec!(5));
    let failing = stat_rule("corners", StatTarget::Away, Comparator::Gte, dec!(5));
    assert!(!evaluate_match(&s, &[passing.clone(), failing]));
    assert!(evaluate_match(&s, &[passing]));
}

#[test]
fn test_rule_deserializes_from_json() {
    let rule: LiveRule = serde_json::from_str(
        r#"{"category": "live_stats", "metric": "corners", "target": "EITHER",
            "comparator": ">=", "value": 8}"#,
    )
    .unwrap();
    let s = snapshot();
    assert!(evaluate_match(&s, &[rule]));
}
