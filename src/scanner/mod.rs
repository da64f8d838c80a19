//! Upcoming-fixture scan coordinator
//!
//! Periodically re-runs every active, alert-enabled filter against the
//! still-scheduled fixtures kicking off inside the lookahead window;
//! cancelled and postponed fixtures never alert. Each (filter, fixture)
//! pair notifies at most once: the coordinator skips pairs it already
//! recorded, re-checks right before inserting, and leaves true races to the
//! unique index in storage. One user's broken filter never aborts the run.

#[cfg(test)]
mod tests;

use crate::compiler::{self, FixtureStore, OrderBy};
use crate::config::ScanConfig;
use crate::error::Result;
use crate::storage::{FilterStore, JobQueue};
use crate::types::{AlertUser, Filter, FixtureStatus};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Queue task name for one notification delivery.
pub const NOTIFY_TASK: &str = "send_notification";

/// Payload of a `send_notification` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyArgs {
    pub match_id: i64,
    pub chat_id: String,
    pub filter_name: String,
    pub fixture_id: i64,
}

/// Counters for one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub users_scanned: u32,
    pub filters_evaluated: u32,
    pub fixtures_matched: u32,
    pub notifications_enqueued: u32,
    pub skipped_duplicates: u32,
    pub errors: u32,
    /// True when the per-run notification cap stopped the pass early.
    pub cap_reached: bool,
}

pub struct ScanCoordinator {
    fixtures: Arc<dyn FixtureStore>,
    filters: Arc<dyn FilterStore>,
    queue: Arc<dyn JobQueue>,
    config: ScanConfig,
}

impl ScanCoordinator {
    pub fn new(
        fixtures: Arc<dyn FixtureStore>,
        filters: Arc<dyn FilterStore>,
        queue: Arc<dyn JobQueue>,
        config: ScanConfig,
    ) -> Self {
        Self {
            fixtures,
            filters,
            queue,
            config,
        }
    }

    /// One scan pass over every eligible (user, filter) pair.
    pub async fn run_scan(&self) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let users = self.filters.list_alert_users().await?;

        'users: for user in &users {
            stats.users_scanned += 1;
            let user_filters = match self.filters.active_alert_filters(user.id).await {
                Ok(filters) => filters,
                Err(e) => {
                    warn!(user_id = user.id, error = %e, "skipping user after filter load failure");
                    stats.errors += 1;
                    continue;
                }
            };

            for filter in &user_filters {
                stats.filters_evaluated += 1;
                match self.scan_filter(user, filter, &mut stats).await {
                    Ok(()) => {}
                    Err(e) => {
                        warn!(
                            user_id = user.id,
                            filter_id = filter.id,
                            error = %e,
                            "filter evaluation failed, scan continues"
                        );
                        stats.errors += 1;
                    }
                }
                if stats.cap_reached {
                    break 'users;
                }
            }
        }

        info!(
            users = stats.users_scanned,
            filters = stats.filters_evaluated,
            matched = stats.fixtures_matched,
            enqueued = stats.notifications_enqueued,
            errors = stats.errors,
            "scan pass finished"
        );
        Ok(stats)
    }

    async fn scan_filter(
        &self,
        user: &AlertUser,
        filter: &Filter,
        stats: &mut ScanStats,
    ) -> Result<()> {
        let now = Utc::now();
        let matches = compiler::find_matches(
            self.fixtures.as_ref(),
            &filter.conditions,
            Some(now),
            Some(now + Duration::hours(self.config.lookahead_hours)),
            // Only fixtures still scheduled to be played; a cancelled or
            // postponed kickoff inside the window must not alert.
            Some(FixtureStatus::Scheduled),
            self.config.max_matches_per_filter,
            OrderBy::KickoffAsc,
        )
        .await?;

        for fixture in &matches {
            if stats.notifications_enqueued >= self.config.max_notifications_per_run {
                stats.cap_reached = true;
                info!(
                    cap = self.config.max_notifications_per_run,
                    "notification cap reached, stopping scan early"
                );
                return Ok(());
            }

            // Cheap skip first; the re-check lives inside the insert, and the
            // unique index decides true races.
            if self.filters.match_exists(filter.id, fixture.id).await? {
                stats.skipped_duplicates += 1;
                continue;
            }
            let Some(created) = self
                .filters
                .insert_match_if_absent(filter.id, fixture.id)
                .await?
            else {
                // A concurrent scanner got there between check and insert.
                stats.skipped_duplicates += 1;
                continue;
            };
            stats.fixtures_matched += 1;

            let args = NotifyArgs {
                match_id: created.id,
                chat_id: user.telegram_chat_id.clone(),
                filter_name: filter.name.clone(),
                fixture_id: fixture.id,
            };
            self.queue
                .enqueue(NOTIFY_TASK, serde_json::to_value(&args)?)
                .await?;
            stats.notifications_enqueued += 1;
            debug!(
                filter_id = filter.id,
                fixture_id = fixture.id,
                "notification enqueued"
            );
        }
        Ok(())
    }
}

/// Repeated scan passes for `run` mode. Errors are logged and the loop keeps
/// going; the interval owns the schedule.
pub async fn scan_loop(coordinator: Arc<ScanCoordinator>, interval_secs: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        if let Err(e) = coordinator.run_scan().await {
            warn!(error = %e, "scan pass failed");
        }
    }
}
