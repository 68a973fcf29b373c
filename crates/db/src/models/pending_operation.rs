//! Row model for the `pending_operations` table.

use hooktrack_core::status::RunState;
use hooktrack_core::types::{OperationHandle, PersistedHandle, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A persisted handle as stored in Postgres.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PendingOperation {
    pub operation_id: String,
    pub status_location: Option<String>,
    pub state: String,
    pub saved_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PendingOperation {
    /// Convert the row back into the domain record. Unknown state text
    /// is read as running, the only state ever written today.
    pub fn into_persisted(self) -> PersistedHandle {
        PersistedHandle {
            handle: OperationHandle {
                id: self.operation_id,
                status_location: self.status_location,
            },
            state: RunState::parse(&self.state).unwrap_or(RunState::Running),
            saved_at: self.saved_at,
        }
    }
}
