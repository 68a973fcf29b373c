//! Caller-supplied polling parameters.
//!
//! A [`PollingConfig`] is read-only for the lifetime of a poll session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default base interval between status checks.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(2);

/// Default wall-clock budget for a single session.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default upper bound on a single wait in exponential mode.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// BackoffMode
// ---------------------------------------------------------------------------

/// How the wait between status checks evolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    /// Always wait the base interval.
    #[default]
    Fixed,
    /// Double the wait each attempt, capped at `max_interval`.
    Exponential,
}

impl BackoffMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffMode::Fixed => "fixed",
            BackoffMode::Exponential => "exponential",
        }
    }

    /// Parse from a string, case-insensitive.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "none" => Ok(BackoffMode::Fixed),
            "exponential" | "exp" => Ok(BackoffMode::Exponential),
            other => Err(CoreError::Validation(format!(
                "unknown backoff mode '{other}' (expected 'fixed' or 'exponential')"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PollingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    pub base_interval: Duration,
    /// Measured from session creation.
    pub timeout: Duration,
    /// Maximum number of status fetches; `None` means unbounded.
    pub max_attempts: Option<u32>,
    pub backoff_mode: BackoffMode,
    /// Cap for exponential mode. Ignored in fixed mode.
    pub max_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_interval: DEFAULT_BASE_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: None,
            backoff_mode: BackoffMode::Fixed,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

impl PollingConfig {
    pub fn with_base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Switch to exponential backoff capped at `max_interval`.
    pub fn exponential(mut self, max_interval: Duration) -> Self {
        self.backoff_mode = BackoffMode::Exponential;
        self.max_interval = max_interval;
        self
    }

    /// Reject configurations the poll loop cannot honour.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.base_interval.is_zero() {
            return Err(CoreError::Validation(
                "base_interval must be greater than zero".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(CoreError::Validation(
                "timeout must be greater than zero".into(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(CoreError::Validation(
                "max_attempts must be at least 1 when set".into(),
            ));
        }
        if self.backoff_mode == BackoffMode::Exponential && self.max_interval < self.base_interval
        {
            return Err(CoreError::Validation(format!(
                "max_interval ({}ms) must not be below base_interval ({}ms)",
                self.max_interval.as_millis(),
                self.base_interval.as_millis(),
            )));
        }
        Ok(())
    }
}
