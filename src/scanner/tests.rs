//! Tests for the scan coordinator

use super::*;
use crate::storage::{Database, MockJobQueue};
use crate::test_util::{test_db, upcoming_fixture};
use crate::types::{Condition, ConditionValue, FixtureStatus, Operator};
use rust_decimal_macros::dec;

fn league_filter() -> Vec<Condition> {
    vec![Condition {
        field: "league_id".to_string(),
        operator: Operator::Eq,
        value: ConditionValue::Number(dec!(39)),
    }]
}

async fn seed_user_and_filter(db: &Database) {
    db.insert_user(1, Some("chat-1"), true).await.unwrap();
    db.create_filter(1, "epl upcoming", &league_filter(), true)
        .await
        .unwrap();
}

fn coordinator(db: Arc<Database>, queue: Arc<dyn JobQueue>) -> ScanCoordinator {
    ScanCoordinator::new(db.clone(), db, queue, ScanConfig::default())
}

#[tokio::test]
async fn test_scan_matches_and_enqueues_once() {
    let t = test_db().await;
    t.db.insert_fixture(&upcoming_fixture(1)).await.unwrap();
    seed_user_and_filter(&t.db).await;
    let db = Arc::new(t.db);

    let mut queue = MockJobQueue::new();
    queue
        .expect_enqueue()
        .withf(|task, args| task == NOTIFY_TASK && args["fixture_id"] == 1)
        .times(1)
        .returning(|_, _| Ok(()));

    let stats = coordinator(db, Arc::new(queue)).run_scan().await.unwrap();
    assert_eq!(stats.users_scanned, 1);
    assert_eq!(stats.filters_evaluated, 1);
    assert_eq!(stats.fixtures_matched, 1);
    assert_eq!(stats.notifications_enqueued, 1);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_second_scan_is_idempotent() {
    let t = test_db().await;
    t.db.insert_fixture(&upcoming_fixture(1)).await.unwrap();
    t.db.insert_fixture(&upcoming_fixture(2)).await.unwrap();
    seed_user_and_filter(&t.db).await;
    let db = Arc::new(t.db);

    // Real queue: jobs land in the jobs table.
    let coord = coordinator(db.clone(), db.clone());
    let first = coord.run_scan().await.unwrap();
    let second = coord.run_scan().await.unwrap();

    assert_eq!(first.notifications_enqueued, 2);
    assert_eq!(second.notifications_enqueued, 0);
    assert_eq!(second.skipped_duplicates, 2);

    // Exactly one queued job per (filter, fixture) pair across both passes.
    let jobs = db.claim_pending_jobs(10).await.unwrap();
    assert_eq!(jobs.len(), 2);
}

#[tokio::test]
async fn test_unverified_users_are_not_scanned() {
    let t = test_db().await;
    t.db.insert_fixture(&upcoming_fixture(1)).await.unwrap();
    t.db.insert_user(1, Some("chat-1"), false).await.unwrap();
    t.db.create_filter(1, "epl", &league_filter(), true)
        .await
        .unwrap();
    let db = Arc::new(t.db);

    let stats = coordinator(db.clone(), db).run_scan().await.unwrap();
    assert_eq!(stats.users_scanned, 0);
}

#[tokio::test]
async fn test_alerts_disabled_filters_are_skipped() {
    let t = test_db().await;
    t.db.insert_fixture(&upcoming_fixture(1)).await.unwrap();
    t.db.insert_user(1, Some("chat-1"), true).await.unwrap();
    t.db.create_filter(1, "no alerts", &league_filter(), false)
        .await
        .unwrap();
    let db = Arc::new(t.db);

    let stats = coordinator(db.clone(), db).run_scan().await.unwrap();
    // No alert-enabled filter means the user is not eligible at all.
    assert_eq!(stats.users_scanned, 0);
    assert_eq!(stats.filters_evaluated, 0);
}

#[tokio::test]
async fn test_notification_cap_stops_run_early() {
    let t = test_db().await;
    for id in 1..=5 {
        t.db.insert_fixture(&upcoming_fixture(id)).await.unwrap();
    }
    seed_user_and_filter(&t.db).await;
    let db = Arc::new(t.db);

    let config = ScanConfig {
        max_notifications_per_run: 3,
        ..ScanConfig::default()
    };
    let coord = ScanCoordinator::new(db.clone(), db.clone(), db, config);
    let stats = coord.run_scan().await.unwrap();

    assert_eq!(stats.notifications_enqueued, 3);
    assert!(stats.cap_reached);
}

#[tokio::test]
async fn test_cancelled_and_postponed_fixtures_are_not_alerted() {
    let t = test_db().await;
    // In-window kickoffs, but neither match will be played.
    let mut cancelled = upcoming_fixture(1);
    cancelled.status = FixtureStatus::Cancelled;
    t.db.insert_fixture(&cancelled).await.unwrap();
    let mut postponed = upcoming_fixture(2);
    postponed.status = FixtureStatus::Postponed;
    t.db.insert_fixture(&postponed).await.unwrap();
    t.db.insert_fixture(&upcoming_fixture(3)).await.unwrap();
    seed_user_and_filter(&t.db).await;
    let db = Arc::new(t.db);

    let mut queue = MockJobQueue::new();
    queue
        .expect_enqueue()
        .withf(|task, args| task == NOTIFY_TASK && args["fixture_id"] == 3)
        .times(1)
        .returning(|_, _| Ok(()));

    let stats = coordinator(db, Arc::new(queue)).run_scan().await.unwrap();
    assert_eq!(stats.fixtures_matched, 1);
    assert_eq!(stats.notifications_enqueued, 1);
}

#[tokio::test]
async fn test_fixtures_outside_window_ignored() {
    let t = test_db().await;
    let mut far = upcoming_fixture(1);
    far.kickoff = Utc::now() + Duration::days(30);
    t.db.insert_fixture(&far).await.unwrap();
    let mut past = upcoming_fixture(2);
    past.kickoff = Utc::now() - Duration::hours(3);
    t.db.insert_fixture(&past).await.unwrap();
    seed_user_and_filter(&t.db).await;
    let db = Arc::new(t.db);

    let stats = coordinator(db.clone(), db).run_scan().await.unwrap();
    assert_eq!(stats.fixtures_matched, 0);
}

#[tokio::test]
async fn test_bad_filter_does_not_abort_run() {
    let t = test_db().await;
    t.db.insert_fixture(&upcoming_fixture(1)).await.unwrap();
    t.db.insert_user(1, Some("chat-1"), true).await.unwrap();
    // Bypass create_filter validation to plant a corrupt rule set, the way a
    // schema migration bug would.
    sqlx::query(
        "INSERT INTO filters (owner_id, name, conditions, active, alerts_enabled, created_at)
         VALUES (1, 'broken', '[{\"field\":\"no_such_field\",\"operator\":\">\",\"value\":1}]', 1, 1, ?)",
    )
    .bind(Utc::now())
    .execute(t.db.pool())
    .await
    .unwrap();
    t.db.create_filter(1, "good", &league_filter(), true)
        .await
        .unwrap();
    let db = Arc::new(t.db);

    let stats = coordinator(db.clone(), db).run_scan().await.unwrap();
    assert_eq!(stats.errors, 1);
    // The healthy filter still matched.
    assert_eq!(stats.fixtures_matched, 1);
}
