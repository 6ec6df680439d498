//! Transfer configuration.
//!
//! Values come from the environment with defaults for anything unset:
//!
//! | variable | default |
//! |----------|---------|
//! | `MONEYFLOW_MAX_TRANSFER_THRESHOLD` | `1000000` |
//! | `MONEYFLOW_LOOKBACK_DAYS` | `10` |
//! | `MONEYFLOW_MAX_LOCK_ATTEMPTS` | `64` |
//! | `MONEYFLOW_LOCK_BACKOFF_MS` | `2` |

use std::str::FromStr;
use std::time::Duration;

use moneyflow_core::Money;

pub const DEFAULT_MAXIMUM_TRANSFER_THRESHOLD: i64 = 1_000_000;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 10;
pub const DEFAULT_MAX_LOCK_ATTEMPTS: u32 = 64;
pub const DEFAULT_LOCK_BACKOFF_MS: u64 = 2;

const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Settings for [`crate::send_money::SendMoneyService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Largest amount a single transfer may move (inclusive).
    pub maximum_transfer_threshold: Money,
    /// How far back the activity window of a loaded account reaches.
    pub lookback: chrono::Duration,
    /// Rounds of "lock source, try target" before a transfer gives up.
    pub max_lock_attempts: u32,
    /// Base pause between contended rounds; jittered per round.
    pub lock_backoff: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            maximum_transfer_threshold: Money::of(DEFAULT_MAXIMUM_TRANSFER_THRESHOLD),
            lookback: chrono::Duration::days(DEFAULT_LOOKBACK_DAYS),
            max_lock_attempts: DEFAULT_MAX_LOCK_ATTEMPTS,
            lock_backoff: Duration::from_millis(DEFAULT_LOCK_BACKOFF_MS),
        }
    }
}

impl TransferConfig {
    /// Read the configuration from `MONEYFLOW_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let threshold: i64 = parse_or(
            &lookup,
            "MONEYFLOW_MAX_TRANSFER_THRESHOLD",
            DEFAULT_MAXIMUM_TRANSFER_THRESHOLD,
        );
        let lookback_days: i64 = parse_or(&lookup, "MONEYFLOW_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS);
        let max_lock_attempts: u32 =
            parse_or(&lookup, "MONEYFLOW_MAX_LOCK_ATTEMPTS", DEFAULT_MAX_LOCK_ATTEMPTS);
        let backoff_ms: u64 = parse_or(&lookup, "MONEYFLOW_LOCK_BACKOFF_MS", DEFAULT_LOCK_BACKOFF_MS);

        Self {
            maximum_transfer_threshold: Money::of(threshold),
            lookback: chrono::Duration::days(lookback_days.clamp(0, MAX_LOOKBACK_DAYS)),
            max_lock_attempts: max_lock_attempts.max(1),
            lock_backoff: Duration::from_millis(backoff_ms),
        }
    }

    pub fn with_maximum_transfer_threshold(mut self, threshold: Money) -> Self {
        self.maximum_transfer_threshold = threshold;
        self
    }

    /// Set the lookback; clamped to zero..=100 years like the environment value.
    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback = clamp_lookback(lookback);
        self
    }

    pub fn with_max_lock_attempts(mut self, attempts: u32) -> Self {
        self.max_lock_attempts = attempts.max(1);
        self
    }

    pub fn with_lock_backoff(mut self, backoff: Duration) -> Self {
        self.lock_backoff = backoff;
        self
    }
}

fn clamp_lookback(lookback: chrono::Duration) -> chrono::Duration {
    lookback.clamp(chrono::Duration::zero(), chrono::Duration::days(MAX_LOOKBACK_DAYS))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + core::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "unparsable config value; using default");
            default
        }),
    }
}
