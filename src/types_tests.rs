//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_fixture_status_round_trip() {
        for status in [
            FixtureStatus::Scheduled,
            FixtureStatus::Live,
            FixtureStatus::Finished,
            FixtureStatus::Postponed,
            FixtureStatus::Cancelled,
        ] {
            assert_eq!(FixtureStatus::from_str(&status.to_string()), Ok(status));
        }
        assert!(FixtureStatus::from_str("abandoned").is_err());
    }

    fn fixture(status: FixtureStatus, home: Option<i32>, away: Option<i32>) -> Fixture {
        Fixture {
            id: 1,
            league_id: 39,
            season: 2024,
            home_team_id: 10,
            away_team_id: 20,
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            kickoff: Utc::now(),
            status,
            home_score: home,
            away_score: away,
            home_odds: None,
            draw_odds: None,
            away_odds: None,
        }
    }

    #[test]
    fn test_fixture_is_finished() {
        assert!(fixture(FixtureStatus::Finished, Some(1), Some(0)).is_finished());
        assert!(!fixture(FixtureStatus::Live, Some(1), Some(0)).is_finished());
    }

    #[test]
    fn test_total_goals_requires_both_scores() {
        assert_eq!(
            fixture(FixtureStatus::Finished, Some(2), Some(1)).total_goals(),
            Some(3)
        );
        assert_eq!(
            fixture(FixtureStatus::Live, Some(2), None).total_goals(),
            None
        );
    }

    #[test]
    fn test_operator_serialization_uses_symbols() {
        assert_eq!(serde_json::to_string(&Operator::Eq).unwrap(), "\"=\"");
        assert_eq!(serde_json::to_string(&Operator::Gte).unwrap(), "\">=\"");
        assert_eq!(serde_json::to_string(&Operator::In).unwrap(), "\"in\"");
        let op: Operator = serde_json::from_str("\"between\"").unwrap();
        assert_eq!(op, Operator::Between);
    }

    #[test]
    fn test_condition_value_untagged_deserialization() {
        let number: ConditionValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(number.as_number(), Some(dec!(2.5)));

        let list: ConditionValue = serde_json::from_str("[2023, 2024]").unwrap();
        let items = list.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_number(), Some(dec!(2023)));

        let text: ConditionValue = serde_json::from_str("\"finished\"").unwrap();
        assert_eq!(text.as_number(), None);
        assert_eq!(text.as_list(), None);
    }

    #[test]
    fn test_condition_json_shape() {
        let raw = r#"{"field": "total_expected_goals", "operator": ">", "value": 2.5}"#;
        let condition: Condition = serde_json::from_str(raw).unwrap();
        assert_eq!(condition.field, "total_expected_goals");
        assert_eq!(condition.operator, Operator::Gt);
        assert_eq!(condition.value.as_number(), Some(dec!(2.5)));
    }

    #[test]
    fn test_bet_type_round_trip() {
        for bet_type in [
            BetType::HomeWin,
            BetType::AwayWin,
            BetType::Draw,
            BetType::Over25,
            BetType::Under25,
        ] {
            assert_eq!(BetType::from_str(&bet_type.to_string()), Ok(bet_type));
        }
        assert_eq!(BetType::Over25.to_string(), "over_2.5");
        assert_eq!(
            serde_json::to_string(&BetType::Under25).unwrap(),
            "\"under_2.5\""
        );
    }

    #[test]
    fn test_season_key_sorts_and_dedupes() {
        assert_eq!(BacktestResult::season_key(&[2024, 2022, 2023]), "2022,2023,2024");
        assert_eq!(BacktestResult::season_key(&[2024, 2024]), "2024");
        assert_eq!(BacktestResult::season_key(&[]), "");
    }

    #[test]
    fn test_backtest_result_expiry() {
        let result = BacktestResult {
            filter_id: 1,
            bet_type: BetType::HomeWin,
            season_key: "2024".to_string(),
            total_bets: 0,
            wins: 0,
            losses: 0,
            pushes: 0,
            win_rate: dec!(0),
            total_profit: dec!(0),
            roi_percentage: dec!(0),
            computed_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        assert!(!result.is_expired(Utc::now()));
        assert!(result.is_expired(Utc::now() + Duration::hours(2)));
    }

    #[test]
    fn test_job_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Cancelled));
        assert!(!Running.can_transition_to(Pending));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Running));
        }
    }
}
