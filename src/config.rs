//! Configuration management for Budgetly.
//!
//! Configuration is loaded from environment variables:
//! - `BUDGETLY_API_URL` - Optional. Base URL of the REST API. Defaults to `http://localhost:8000/api/v1`.
//! - `BUDGETLY_API_TOKEN` - Optional. Bearer token for an existing session.
//! - `BUDGETLY_RETRY_PRESET` - Optional. `quick`, `standard`, `aggressive` or `none`. Defaults to `standard`.
//! - `BUDGETLY_CACHE_TTL_SECS` - Optional. Default response cache TTL. Defaults to 300.
//! - `BUDGETLY_CACHE_SWEEP_SECS` - Optional. Expired-entry sweep interval, 0 disables. Defaults to 60.
//! - `BUDGETLY_CACHE_MAX_STALE_SECS` - Optional. How long past its TTL an entry is kept for stale fallback. Defaults to 86400.
//! - `BUDGETLY_REQUEST_TIMEOUT_SECS` - Optional. Per-request timeout. Defaults to 30.
//! - `BUDGETLY_STALE_ON_ERROR` - Optional. Serve stale cache entries when a refresh fails. Defaults to true.
//! - `BUDGETLY_WEEK_START` - Optional. First day of a weekly budget period. Defaults to `sunday`.

use std::time::Duration;

use chrono::Weekday;
use thiserror::Error;
use url::Url;

use crate::retry::RetryPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub api_token: Option<String>,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    /// `None` when sweeping is disabled.
    pub cache_sweep_interval: Option<Duration>,
    pub cache_max_stale: Duration,
    pub request_timeout: Duration,
    pub stale_on_error: bool,
    pub week_start: Weekday,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let raw_url = get("BUDGETLY_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url =
            Url::parse(&raw_url).map_err(|e| ConfigError::invalid("BUDGETLY_API_URL", &raw_url, e))?;

        let mut config = Self {
            api_url,
            api_token: get("BUDGETLY_API_TOKEN"),
            retry: RetryPolicy::standard(),
            cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Some(Duration::from_secs(60)),
            cache_max_stale: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_secs(30),
            stale_on_error: true,
            week_start: Weekday::Sun,
        };

        if let Some(raw) = get("BUDGETLY_RETRY_PRESET") {
            config.retry = raw
                .parse()
                .map_err(|e| ConfigError::invalid("BUDGETLY_RETRY_PRESET", &raw, e))?;
        }

        if let Some(raw) = get("BUDGETLY_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(parse_secs("BUDGETLY_CACHE_TTL_SECS", &raw)?);
        }

        if let Some(raw) = get("BUDGETLY_CACHE_SWEEP_SECS") {
            let secs = parse_secs("BUDGETLY_CACHE_SWEEP_SECS", &raw)?;
            config.cache_sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(raw) = get("BUDGETLY_CACHE_MAX_STALE_SECS") {
            config.cache_max_stale =
                Duration::from_secs(parse_secs("BUDGETLY_CACHE_MAX_STALE_SECS", &raw)?);
        }

        if let Some(raw) = get("BUDGETLY_REQUEST_TIMEOUT_SECS") {
            let secs = parse_secs("BUDGETLY_REQUEST_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError::invalid(
                    "BUDGETLY_REQUEST_TIMEOUT_SECS",
                    &raw,
                    "must be greater than zero",
                ));
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = get("BUDGETLY_STALE_ON_ERROR") {
            config.stale_on_error = parse_bool("BUDGETLY_STALE_ON_ERROR", &raw)?;
        }

        if let Some(raw) = get("BUDGETLY_WEEK_START") {
            config.week_start = raw
                .parse::<Weekday>()
                .map_err(|_| ConfigError::invalid("BUDGETLY_WEEK_START", &raw, "expected a weekday name"))?;
        }

        Ok(config)
    }
}

fn parse_secs(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>()
        .map_err(|e| ConfigError::invalid(key, raw, e))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "expected true or false")),
    }
}
