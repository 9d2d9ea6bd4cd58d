//! Retry policy presets.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounds for retrying a single logical request.
///
/// # Invariants
/// - `base_delay > 0`
/// - `max_delay >= base_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Two quick retries for interactive lookups.
    pub const fn quick() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(2_000),
        }
    }

    /// Default for most GET requests.
    pub const fn standard() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
        }
    }

    /// For requests that must eventually land (e.g. initial data load).
    pub const fn aggressive() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
        }
    }

    /// Single attempt.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(1_000),
        }
    }

    /// Total number of times the operation may be invoked.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Unknown preset name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown retry preset '{0}'. Expected one of: quick, standard, aggressive, none")]
pub struct PolicyParseError(pub String);

impl FromStr for RetryPolicy {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(Self::quick()),
            "standard" => Ok(Self::standard()),
            "aggressive" => Ok(Self::aggressive()),
            "none" => Ok(Self::none()),
            other => Err(PolicyParseError(other.to_string())),
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} retries, {}ms..{}ms",
            self.max_retries,
            self.base_delay.as_millis(),
            self.max_delay.as_millis()
        )
    }
}
