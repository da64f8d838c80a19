//! Token-bucket rate limiter over a shared counter store
//!
//! Capacity N, continuous refill at N tokens per second. Token count and
//! last-refill time live in the counter store so every delivery path in the
//! deployment draws from the same budget.
//!
//! The read-modify-write across `get` and `set` is not atomic: two
//! concurrent acquirers can both observe the same count and over-consume.
//! That window is accepted; the cap is approximate under parallelism.

use crate::error::Result;
use crate::storage::CounterStore;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const TOKENS_KEY: &str = "notify:tokens";
const REFILL_KEY: &str = "notify:last_refill_ms";

pub struct RateLimiter {
    counter: Arc<dyn CounterStore>,
    capacity: f64,
    /// Tokens added per millisecond.
    refill_per_ms: f64,
}

impl RateLimiter {
    /// Bucket of `capacity` tokens refilling at `capacity` per second.
    pub fn new(counter: Arc<dyn CounterStore>, capacity: u32) -> Self {
        Self {
            counter,
            capacity: capacity as f64,
            refill_per_ms: capacity as f64 / 1000.0,
        }
    }

    /// Take one token if available. Returns false when the bucket is empty;
    /// callers decide whether to retry or fail the send.
    pub async fn acquire(&self) -> Result<bool> {
        let now_ms = unix_millis();
        let last_refill = self.counter.get(REFILL_KEY).await?.unwrap_or(now_ms);
        let stored = self.counter.get(TOKENS_KEY).await?.unwrap_or(self.capacity);

        let elapsed_ms = (now_ms - last_refill).max(0.0);
        let tokens = (stored + elapsed_ms * self.refill_per_ms).min(self.capacity);

        if tokens < 1.0 {
            // Persist the refilled value so a later acquire starts from it.
            self.counter.set(TOKENS_KEY, tokens).await?;
            self.counter.set(REFILL_KEY, now_ms).await?;
            return Ok(false);
        }

        self.counter.set(TOKENS_KEY, tokens - 1.0).await?;
        self.counter.set(REFILL_KEY, now_ms).await?;
        Ok(true)
    }

    /// Tokens currently in the bucket, after refill. Diagnostic only.
    pub async fn available(&self) -> Result<f64> {
        let now_ms = unix_millis();
        let last_refill = self.counter.get(REFILL_KEY).await?.unwrap_or(now_ms);
        let stored = self.counter.get(TOKENS_KEY).await?.unwrap_or(self.capacity);
        let elapsed_ms = (now_ms - last_refill).max(0.0);
        Ok((stored + elapsed_ms * self.refill_per_ms).min(self.capacity))
    }
}

fn unix_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}
