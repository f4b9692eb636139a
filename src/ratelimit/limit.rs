//! Limiter configuration and admission outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShieldError};

/// Default number of admissions per window.
const DEFAULT_LIMIT: u64 = 100;
/// Default window length.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Configuration for a single limiter instance.
///
/// Immutable once a limiter has been built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Maximum admissions within any rolling window. Zero never admits.
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Length of the rolling window
    #[serde(rename = "window_ms", with = "millis", default = "default_window")]
    pub window: Duration,
}

impl LimitConfig {
    /// Create a validated configuration.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        let config = Self { limit, window };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engines cannot evaluate.
    ///
    /// Both engines work at millisecond resolution, so a window shorter than
    /// one millisecond collapses to zero and is refused.
    pub fn validate(&self) -> Result<()> {
        if self.window.as_millis() == 0 {
            return Err(ShieldError::InvalidConfig(format!(
                "window must be at least 1ms, got {:?}",
                self.window
            )));
        }
        if self.window.as_millis() > i64::MAX as u128 {
            return Err(ShieldError::InvalidConfig(format!(
                "window {:?} is too large",
                self.window
            )));
        }
        Ok(())
    }

    /// Window length in milliseconds.
    pub fn window_millis(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_window() -> Duration {
    DEFAULT_WINDOW
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Result of one admission attempt.
///
/// `remaining` is only meaningful at the instant of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Whether the action was admitted and recorded
    pub allowed: bool,
    /// Further admissions available before the identifier is blocked
    pub remaining: u64,
}

impl Outcome {
    /// An admitted call with `remaining` quota left.
    pub fn allowed(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
        }
    }

    /// A blocked call. Blocked calls never report remaining quota.
    pub fn blocked() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}
