use std::time::Duration;

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// PollError
// ---------------------------------------------------------------------------

/// Discriminant of a fatal tracking outcome.
///
/// Callers branch on this to decide between retry UI
/// ([`TimedOut`](Self::TimedOut), [`AttemptsExceeded`](Self::AttemptsExceeded)),
/// terminal failure UI ([`Remote`](Self::Remote)) and silence
/// ([`Cancelled`](Self::Cancelled)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollErrorKind {
    InvalidRequest,
    Transport,
    Remote,
    MissingWiring,
    TimedOut,
    AttemptsExceeded,
    Cancelled,
}

impl PollErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollErrorKind::InvalidRequest => "invalid_request",
            PollErrorKind::Transport => "transport",
            PollErrorKind::Remote => "remote",
            PollErrorKind::MissingWiring => "missing_wiring",
            PollErrorKind::TimedOut => "timed_out",
            PollErrorKind::AttemptsExceeded => "attempts_exceeded",
            PollErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Every fatal outcome of invoking or tracking an operation.
///
/// Transient fetch failures never surface here; they are retried inside
/// the poll loop.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The request was rejected locally before anything was sent.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The initial invocation could not reach the remote side.
    #[error("Transport error: {message}")]
    Transport {
        operation_id: Option<String>,
        message: String,
    },

    /// The remote side reported a terminal failure, either for the
    /// operation itself or by rejecting the initial request.
    #[error("Remote operation failed: {message}")]
    Remote {
        operation_id: Option<String>,
        message: String,
    },

    /// A status location or credential needed to poll is not configured.
    #[error("Cannot track operation: {reason}")]
    MissingWiring {
        operation_id: Option<String>,
        reason: String,
    },

    #[error("Operation {operation_id} timed out after {}ms", .elapsed.as_millis())]
    TimedOut {
        operation_id: String,
        elapsed: Duration,
    },

    #[error("Operation {operation_id} still running after {attempts} status checks")]
    AttemptsExceeded { operation_id: String, attempts: u32 },

    #[error("Tracking of operation {operation_id} was cancelled")]
    Cancelled { operation_id: String },
}

impl PollError {
    pub fn kind(&self) -> PollErrorKind {
        match self {
            PollError::InvalidRequest { .. } => PollErrorKind::InvalidRequest,
            PollError::Transport { .. } => PollErrorKind::Transport,
            PollError::Remote { .. } => PollErrorKind::Remote,
            PollError::MissingWiring { .. } => PollErrorKind::MissingWiring,
            PollError::TimedOut { .. } => PollErrorKind::TimedOut,
            PollError::AttemptsExceeded { .. } => PollErrorKind::AttemptsExceeded,
            PollError::Cancelled { .. } => PollErrorKind::Cancelled,
        }
    }

    /// Identifier of the operation the error belongs to, when known.
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            PollError::Transport { operation_id, .. }
            | PollError::Remote { operation_id, .. }
            | PollError::MissingWiring { operation_id, .. } => operation_id.as_deref(),
            PollError::TimedOut { operation_id, .. }
            | PollError::AttemptsExceeded { operation_id, .. }
            | PollError::Cancelled { operation_id } => Some(operation_id),
            PollError::InvalidRequest { .. } => None,
        }
    }

    /// Whether the operation may still finish remotely, so offering the
    /// user a retry (or a later resume) makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            PollErrorKind::TimedOut | PollErrorKind::AttemptsExceeded
        )
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind() == PollErrorKind::Cancelled
    }
}
