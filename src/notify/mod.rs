//! Notification delivery
//!
//! `Notifier` is the transport seam; `TelegramNotifier` implements it over
//! the Bot API. `deliver_match_notification` is the full delivery path the
//! worker drives for one `send_notification` job: rate-limit acquire with
//! bounded retries, send, then record the result on the FilterMatch so an
//! already-sent notification is never resent.

pub mod rate_limit;

pub use rate_limit::RateLimiter;

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};
use crate::scanner::NotifyArgs;
use crate::storage::FilterStore;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Transport seam for one outgoing message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Telegram Bot API notifier. Disabled instances swallow sends with a log
/// line so the rest of the pipeline behaves identically without a token.
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: Some(bot_token),
        }
    }

    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: None,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, chat_id: &str, text: &str) -> Result<()> {
        let Some(token) = &self.bot_token else {
            info!(chat_id, "telegram disabled, dropping notification");
            return Ok(());
        };
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Delivery(format!(
                "telegram returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

/// Message body for one filter match alert.
pub fn format_match_message(args: &NotifyArgs) -> String {
    format!(
        "⚽ <b>{}</b> matched fixture #{}\nOpen your dashboard for details.",
        args.filter_name, args.fixture_id
    )
}

/// Deliver one match notification end to end.
///
/// The rate-limit acquire is retried a bounded number of times with a fixed
/// delay; running out of retries fails this attempt (the job runner owns any
/// larger backoff). Success and failure are both recorded on the match row.
pub async fn deliver_match_notification(
    filters: &dyn FilterStore,
    notifier: &dyn Notifier,
    limiter: &RateLimiter,
    config: &RateLimitConfig,
    args: &NotifyArgs,
) -> Result<()> {
    let record = filters.get_match(args.match_id).await?;
    if record.notification_sent {
        info!(match_id = args.match_id, "notification already sent, skipping");
        return Ok(());
    }

    let mut acquired = false;
    for attempt in 0..config.acquire_attempts {
        if limiter.acquire().await? {
            acquired = true;
            break;
        }
        if attempt + 1 < config.acquire_attempts {
            tokio::time::sleep(Duration::from_millis(config.acquire_delay_ms)).await;
        }
    }
    if !acquired {
        let err = Error::RateLimited {
            attempts: config.acquire_attempts,
        };
        filters
            .record_match_error(args.match_id, &err.to_string())
            .await?;
        return Err(err);
    }

    match notifier
        .deliver(&args.chat_id, &format_match_message(args))
        .await
    {
        Ok(()) => {
            filters.mark_match_notified(args.match_id).await?;
            info!(match_id = args.match_id, "notification delivered");
            Ok(())
        }
        Err(e) => {
            warn!(match_id = args.match_id, error = %e, "notification delivery failed");
            filters
                .record_match_error(args.match_id, &e.to_string())
                .await?;
            Err(e)
        }
    }
}
