//! Core runtime configuration.
//!
//! # Responsibility
//! - Carry tunables for connection bootstrap, append retries and event paging.
//! - Load host-provided JSON where every field is optional.
//!
//! # Invariants
//! - `CoreConfig::default()` is always a usable configuration.
//! - `RetryPolicy::max_attempts` is at least 1 after normalization.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 64;
const DEFAULT_BASE_DELAY_MS: u64 = 2;
const DEFAULT_MAX_DELAY_MS: u64 = 250;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_EVENTS_PAGE_SIZE: u32 = 50;

/// Retry budget for optimistic appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn normalized(self) -> Self {
        Self {
            max_attempts: self.max_attempts.max(1),
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms.max(self.base_delay_ms),
        }
    }

    /// Upper bound of the backoff window after `failed_attempts` conflicts:
    /// `base * 2^(n-1)`, capped at `max_delay_ms`.
    pub fn backoff_ceiling(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 || self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let shift = failed_attempts.saturating_sub(1).min(16);
        let value = self.base_delay_ms.saturating_mul(1_u64 << shift);
        Duration::from_millis(value.min(self.max_delay_ms))
    }
}

/// Top-level configuration for `pulsestand_core`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub retry: RetryPolicy,
    /// SQLite busy timeout applied to every opened connection.
    pub busy_timeout_ms: u64,
    /// Rows fetched per round trip by lazy event cursors.
    pub events_page_size: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            events_page_size: DEFAULT_EVENTS_PAGE_SIZE,
        }
    }
}

impl CoreConfig {
    /// Parses JSON configuration; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validated()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        if self.events_page_size == 0 {
            return Err(ConfigError::Invalid("events_page_size must be positive"));
        }
        self.retry = self.retry.normalized();
        Ok(self)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid core config: {err}"),
            Self::Invalid(message) => write!(f, "invalid core config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
