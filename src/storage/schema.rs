//! Table definitions, created on connect

use crate::error::Result;
use sqlx::SqlitePool;

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS fixtures (
        id INTEGER PRIMARY KEY,
        league_id INTEGER NOT NULL,
        season INTEGER NOT NULL,
        home_team_id INTEGER NOT NULL,
        away_team_id INTEGER NOT NULL,
        home_team TEXT NOT NULL,
        away_team TEXT NOT NULL,
        kickoff TEXT NOT NULL,
        status TEXT NOT NULL,
        home_score INTEGER,
        away_score INTEGER,
        home_odds REAL,
        draw_odds REAL,
        away_odds REAL
    )",
    "CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff ON fixtures (kickoff)",
    "CREATE INDEX IF NOT EXISTS idx_fixtures_season ON fixtures (season, status)",
    "CREATE TABLE IF NOT EXISTS team_stats (
        team_id INTEGER NOT NULL,
        season INTEGER NOT NULL,
        goals_avg REAL NOT NULL,
        conceded_avg REAL NOT NULL,
        clean_sheet_avg REAL NOT NULL,
        form_avg REAL NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (team_id, season)
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        telegram_chat_id TEXT,
        channel_verified INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS filters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        conditions TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        alerts_enabled INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    // The unique index is the dedup invariant: at most one match per
    // (filter, fixture), regardless of how many scanners race.
    "CREATE TABLE IF NOT EXISTS filter_matches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filter_id INTEGER NOT NULL REFERENCES filters (id) ON DELETE CASCADE,
        fixture_id INTEGER NOT NULL REFERENCES fixtures (id) ON DELETE CASCADE,
        matched_at TEXT NOT NULL,
        notification_sent INTEGER NOT NULL DEFAULT 0,
        notified_at TEXT,
        last_error TEXT,
        bet_result TEXT NOT NULL DEFAULT 'pending',
        UNIQUE (filter_id, fixture_id)
    )",
    "CREATE TABLE IF NOT EXISTS backtest_results (
        filter_id INTEGER NOT NULL,
        bet_type TEXT NOT NULL,
        season_key TEXT NOT NULL,
        total_bets INTEGER NOT NULL,
        wins INTEGER NOT NULL,
        losses INTEGER NOT NULL,
        pushes INTEGER NOT NULL,
        win_rate TEXT NOT NULL,
        total_profit TEXT NOT NULL,
        roi_percentage TEXT NOT NULL,
        computed_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        PRIMARY KEY (filter_id, bet_type, season_key)
    )",
    "CREATE TABLE IF NOT EXISTS backtest_jobs (
        id TEXT PRIMARY KEY,
        owner_id INTEGER NOT NULL,
        filter_id INTEGER NOT NULL,
        bet_type TEXT NOT NULL,
        seasons TEXT NOT NULL,
        stake TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        progress INTEGER NOT NULL DEFAULT 0,
        result TEXT,
        error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task TEXT NOT NULL,
        args TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
];

pub async fn create_all(pool: &SqlitePool) -> Result<()> {
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}
