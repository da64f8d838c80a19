//! Background job worker
//!
//! Polls the `jobs` table and dispatches queued tasks: notification delivery
//! (with bounded exponential backoff) and backtest runs. Also sweeps the
//! `backtest_jobs` table for pending jobs enqueued outside the generic
//! queue. One worker per process; claim-then-finish is not concurrency-safe
//! across processes.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backtest::BacktestEngine;
use crate::config::{RateLimitConfig, WorkerConfig};
use crate::notify::{deliver_match_notification, Notifier, RateLimiter};
use crate::scanner::{NotifyArgs, NOTIFY_TASK};
use crate::storage::{Database, QueuedJob};

pub const BACKTEST_TASK: &str = "run_backtest";

pub struct Worker {
    db: Arc<Database>,
    notifier: Arc<dyn Notifier>,
    limiter: RateLimiter,
    engine: BacktestEngine,
    config: WorkerConfig,
    rate_config: RateLimitConfig,
}

impl Worker {
    pub fn new(
        db: Arc<Database>,
        notifier: Arc<dyn Notifier>,
        limiter: RateLimiter,
        engine: BacktestEngine,
        config: WorkerConfig,
        rate_config: RateLimitConfig,
    ) -> Self {
        Self {
            db,
            notifier,
            limiter,
            engine,
            config,
            rate_config,
        }
    }

    /// Poll forever. Each tick drains the generic queue and sweeps pending
    /// backtest jobs.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "worker started"
        );
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "worker tick failed");
            }
            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
        }
    }

    /// One poll: claim pending jobs, run each to completion, sweep backtests.
    pub async fn tick(&self) -> crate::error::Result<usize> {
        let jobs = self.db.claim_pending_jobs(50).await?;
        let mut processed = 0;
        for job in jobs {
            let job_id = job.id;
            let ok = self.dispatch(job).await;
            self.db.finish_queue_job(job_id, ok).await?;
            processed += 1;
        }

        for pending in self.db.pending_backtest_jobs(10).await? {
            if let Err(e) = self.engine.run_job(pending.id).await {
                error!(job_id = %pending.id, error = %e, "backtest job failed");
            }
            processed += 1;
        }
        Ok(processed)
    }

    async fn dispatch(&self, job: QueuedJob) -> bool {
        match job.task.as_str() {
            NOTIFY_TASK => match serde_json::from_value::<NotifyArgs>(job.args.clone()) {
                Ok(args) => self.deliver_with_retries(&args).await,
                Err(e) => {
                    error!(job_id = job.id, error = %e, "malformed notification args");
                    false
                }
            },
            BACKTEST_TASK => self.run_backtest_job(&job).await,
            other => {
                warn!(job_id = job.id, task = other, "unknown task, dropping");
                false
            }
        }
    }

    /// Deliver one notification, retrying transient failures with
    /// exponential backoff plus jitter. Exhausting the attempts fails the
    /// job; the error is already recorded on the match row.
    async fn deliver_with_retries(&self, args: &NotifyArgs) -> bool {
        let attempts = self.config.max_delivery_attempts.max(1);
        for attempt in 0..attempts {
            match deliver_match_notification(
                self.db.as_ref(),
                self.notifier.as_ref(),
                &self.limiter,
                &self.rate_config,
                args,
            )
            .await
            {
                Ok(()) => return true,
                Err(e) if attempt + 1 < attempts => {
                    warn!(
                        match_id = args.match_id,
                        attempt = attempt + 1,
                        error = %e,
                        "delivery failed, backing off"
                    );
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                Err(e) => {
                    error!(match_id = args.match_id, error = %e, "delivery failed for good");
                    return false;
                }
            }
        }
        false
    }

    async fn run_backtest_job(&self, job: &QueuedJob) -> bool {
        let Some(id) = job.args.get("job_id").and_then(|v| v.as_str()) else {
            error!(job_id = job.id, "backtest task missing job_id");
            return false;
        };
        let Ok(uuid) = Uuid::parse_str(id) else {
            error!(job_id = job.id, job_uuid = id, "backtest task has invalid job_id");
            return false;
        };
        match self.engine.run_job(uuid).await {
            Ok(()) => true,
            Err(e) => {
                error!(job_uuid = %uuid, error = %e, "backtest job failed");
                false
            }
        }
    }

    /// Exponential backoff with up to 50% jitter, capped at 30s.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base_ms.saturating_mul(1 << attempt.min(16));
        let jitter = rand::rng().random_range(0..=base / 2);
        Duration::from_millis((base + jitter).min(30_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BacktestConfig;
    use crate::notify::MockNotifier;
    use crate::storage::{Database, FilterStore, JobQueue, MemoryCounterStore};
    use crate::test_util::{test_db, upcoming_fixture};
    use crate::types::{BacktestJob, BetType, Condition, ConditionValue, JobStatus, Operator};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn league_condition() -> Vec<Condition> {
        vec![Condition {
            field: "league_id".to_string(),
            operator: Operator::Eq,
            value: ConditionValue::Number(dec!(39)),
        }]
    }

    fn worker(db: Arc<Database>, notifier: MockNotifier) -> Worker {
        let engine = BacktestEngine::new(db.clone(), db.clone(), BacktestConfig::default());
        Worker::new(
            db,
            Arc::new(notifier),
            RateLimiter::new(Arc::new(MemoryCounterStore::default()), 100),
            engine,
            WorkerConfig {
                poll_interval_secs: 1,
                max_delivery_attempts: 2,
                backoff_base_ms: 1,
            },
            RateLimitConfig {
                capacity: 100,
                acquire_attempts: 1,
                acquire_delay_ms: 1,
            },
        )
    }

    async fn seed_match(db: &Database) -> NotifyArgs {
        db.insert_user(1, Some("chat-1"), true).await.unwrap();
        db.insert_fixture(&upcoming_fixture(1)).await.unwrap();
        let filter = db
            .create_filter(1, "epl", &league_condition(), true)
            .await
            .unwrap();
        let record = db
            .insert_match_if_absent(filter.id, 1)
            .await
            .unwrap()
            .unwrap();
        NotifyArgs {
            match_id: record.id,
            chat_id: "chat-1".to_string(),
            filter_name: filter.name,
            fixture_id: 1,
        }
    }

    #[tokio::test]
    async fn test_tick_delivers_queued_notification() {
        let t = test_db().await;
        let db = Arc::new(t.db);
        let args = seed_match(&db).await;
        db.enqueue(NOTIFY_TASK, serde_json::to_value(&args).unwrap())
            .await
            .unwrap();

        let mut notifier = MockNotifier::new();
        notifier
            .expect_deliver()
            .times(1)
            .returning(|_, _| Ok(()));
        let worker = worker(db.clone(), notifier);

        assert_eq!(worker.tick().await.unwrap(), 1);
        let record = db.get_match(args.match_id).await.unwrap();
        assert!(record.notification_sent);
        // Queue is drained.
        assert!(db.claim_pending_jobs(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let t = test_db().await;
        let db = Arc::new(t.db);
        let args = seed_match(&db).await;
        db.enqueue(NOTIFY_TASK, serde_json::to_value(&args).unwrap())
            .await
            .unwrap();

        let mut notifier = MockNotifier::new();
        let mut calls = 0;
        notifier.expect_deliver().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(crate::error::Error::Delivery("flaky".to_string()))
            } else {
                Ok(())
            }
        });
        let worker = worker(db.clone(), notifier);

        worker.tick().await.unwrap();
        let record = db.get_match(args.match_id).await.unwrap();
        assert!(record.notification_sent);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_job() {
        let t = test_db().await;
        let db = Arc::new(t.db);
        let args = seed_match(&db).await;
        db.enqueue(NOTIFY_TASK, serde_json::to_value(&args).unwrap())
            .await
            .unwrap();

        let mut notifier = MockNotifier::new();
        notifier
            .expect_deliver()
            .times(2)
            .returning(|_, _| Err(crate::error::Error::Delivery("down".to_string())));
        let worker = worker(db.clone(), notifier);

        worker.tick().await.unwrap();
        let record = db.get_match(args.match_id).await.unwrap();
        assert!(!record.notification_sent);
        assert!(record.last_error.is_some());
        assert!(db.claim_pending_jobs(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_task_is_dropped() {
        let t = test_db().await;
        let db = Arc::new(t.db);
        db.enqueue("mint_nft", json!({})).await.unwrap();
        let worker = worker(db.clone(), MockNotifier::new());
        assert_eq!(worker.tick().await.unwrap(), 1);
        assert!(db.claim_pending_jobs(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_backtest_job_is_swept() {
        let t = test_db().await;
        let db = Arc::new(t.db);
        db.insert_user(1, None, false).await.unwrap();
        let filter = db
            .create_filter(1, "epl", &league_condition(), false)
            .await
            .unwrap();
        let job = BacktestJob {
            id: uuid::Uuid::new_v4(),
            owner_id: 1,
            filter_id: filter.id,
            bet_type: BetType::HomeWin,
            seasons: vec![2024],
            stake: dec!(1),
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db.create_backtest_job(&job).await.unwrap();

        let worker = worker(db.clone(), MockNotifier::new());
        worker.tick().await.unwrap();

        let done = db.get_backtest_job(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = 500u64;
        // attempt 0: 500..=750ms, attempt 3: 4000..=6000ms.
        for (attempt, low) in [(0u32, 500u64), (3, 4000)] {
            let d = base.saturating_mul(1 << attempt);
            assert!(d >= low);
        }
    }
}
