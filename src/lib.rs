//! Matchscout — football fixture filter engine
//!
//! Users define filters (condition lists over fixture and team-form fields),
//! backtest them against historical results, and get Telegram alerts when an
//! upcoming fixture matches.
//!
//! ## Architecture
//!
//! ```text
//! Scanner (periodic) → Compiler (rules → SQL) → SQLite fixtures/stats
//!       ↓ enqueue                                       ↑
//! Worker (job queue) → Notifier (Telegram, rate-limited)
//!       ↓
//! Backtest Engine (simulate, aggregate, analytics, cache)
//! ```

pub mod backtest;
pub mod compiler;
pub mod config;
pub mod error;
pub mod live;
pub mod notify;
pub mod rules;
pub mod scanner;
pub mod storage;
pub mod types;
pub mod worker;

#[cfg(test)]
mod types_tests;
#[cfg(test)]
pub(crate) mod test_util;
