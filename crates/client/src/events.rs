//! Events emitted while operations are invoked and tracked.
//!
//! Published on a [`tokio::sync::broadcast`] channel; call
//! [`Tracker::subscribe`](crate::tracker::Tracker::subscribe) to receive
//! them. They replace ad hoc progress and status-change callbacks.

use hooktrack_core::error::PollErrorKind;
use serde::Serialize;

/// A state change of a tracked operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// The webhook accepted the request and returned a handle.
    Invoked { operation_id: String },

    /// A session was rebuilt from a persisted handle.
    Resumed { operation_id: String },

    /// The poll loop started for an operation.
    PollingStarted { operation_id: String },

    /// A status check reported progress (at most once per cycle).
    Progress {
        operation_id: String,
        attempt: u32,
        /// Completion fraction in `[0.0, 1.0]`.
        fraction: f64,
    },

    /// The operation finished successfully.
    Completed { operation_id: String, attempts: u32 },

    /// Tracking ended without a result.
    Failed {
        operation_id: String,
        kind: PollErrorKind,
        /// Human-readable error description.
        message: String,
    },
}

impl TrackerEvent {
    pub fn operation_id(&self) -> &str {
        match self {
            TrackerEvent::Invoked { operation_id }
            | TrackerEvent::Resumed { operation_id }
            | TrackerEvent::PollingStarted { operation_id }
            | TrackerEvent::Progress { operation_id, .. }
            | TrackerEvent::Completed { operation_id, .. }
            | TrackerEvent::Failed { operation_id, .. } => operation_id,
        }
    }
}
