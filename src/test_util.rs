//! Shared helpers for database-backed tests

use crate::storage::Database;
use crate::types::{Fixture, FixtureStatus, TeamComputedStat};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

/// A file-backed SQLite database in a temp dir. Kept on a file so every
/// pooled connection sees the same data.
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("test.db");
    let db = Database::connect(&format!("sqlite://{}", path.display()))
        .await
        .expect("connect test db");
    TestDb { db, _dir: dir }
}

pub fn kickoff(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 15, 0, 0).unwrap()
}

/// A finished fixture with the given score and no bookmaker odds.
pub fn finished_fixture(id: i64, home_score: i32, away_score: i32) -> Fixture {
    Fixture {
        id,
        league_id: 39,
        season: 2024,
        home_team_id: 100 + id,
        away_team_id: 200 + id,
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        kickoff: kickoff(2024, 3, (id % 27 + 1) as u32),
        status: FixtureStatus::Finished,
        home_score: Some(home_score),
        away_score: Some(away_score),
        home_odds: None,
        draw_odds: None,
        away_odds: None,
    }
}

/// An upcoming fixture kicking off in the near future.
pub fn upcoming_fixture(id: i64) -> Fixture {
    Fixture {
        id,
        league_id: 39,
        season: 2025,
        home_team_id: 100 + id,
        away_team_id: 200 + id,
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        kickoff: Utc::now() + chrono::Duration::hours(6),
        status: FixtureStatus::Scheduled,
        home_score: None,
        away_score: None,
        home_odds: None,
        draw_odds: None,
        away_odds: None,
    }
}

pub fn team_stat(team_id: i64, season: i32, goals_avg: Decimal) -> TeamComputedStat {
    TeamComputedStat {
        team_id,
        season,
        goals_avg,
        conceded_avg: goals_avg / Decimal::TWO,
        clean_sheet_avg: Decimal::new(3, 1),
        form_avg: Decimal::new(18, 1),
        updated_at: Utc::now(),
    }
}
