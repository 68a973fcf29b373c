//! Normalized status records returned by a single status check.

use serde::{Deserialize, Serialize};

/// Fallback message for an `error` status that carries no description.
pub const DEFAULT_REMOTE_ERROR: &str = "Remote operation failed";

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Three-valued lifecycle of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Complete,
    Error,
}

impl RunState {
    /// String representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Complete => "complete",
            RunState::Error => "error",
        }
    }

    /// Parse a status string reported by a custom status endpoint.
    ///
    /// Case-insensitive and tolerant of the common synonyms; returns
    /// `None` for anything unrecognised so the caller can treat the body
    /// as malformed.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" | "pending" | "queued" | "waiting" | "new" => Some(RunState::Running),
            "complete" | "completed" | "success" | "succeeded" | "done" => {
                Some(RunState::Complete)
            }
            "error" | "failed" | "failure" | "canceled" | "cancelled" => Some(RunState::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

// ---------------------------------------------------------------------------
// StatusRecord
// ---------------------------------------------------------------------------

/// Result of one status fetch.
///
/// Exactly one of `result` / `error_message` is meaningful, selected by
/// `state`. Use the constructors rather than building the struct by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: RunState,
    /// Completion fraction in `[0.0, 1.0]`, when the remote side reports one.
    pub progress: Option<f64>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl StatusRecord {
    pub fn running(progress: Option<f64>) -> Self {
        Self {
            state: RunState::Running,
            progress: progress.map(clamp_fraction),
            result: None,
            error_message: None,
        }
    }

    pub fn complete(result: serde_json::Value) -> Self {
        Self {
            state: RunState::Complete,
            progress: Some(1.0),
            result: Some(result),
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: RunState::Error,
            progress: None,
            result: None,
            error_message: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Normalize a raw progress number into a fraction.
///
/// Values in `(1, 100]` are read as percentages. Everything is clamped to
/// `[0.0, 1.0]`; non-finite input yields `None`.
pub fn normalize_progress(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let fraction = if raw > 1.0 && raw <= 100.0 {
        raw / 100.0
    } else {
        raw
    };
    Some(clamp_fraction(fraction))
}

fn clamp_fraction(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
