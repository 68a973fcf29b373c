use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifies a remote operation.
///
/// Produced by the invoker, consumed by status fetchers. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    /// Opaque operation identifier assigned by the remote side.
    pub id: String,
    /// Status URL or URL template, when the remote side provided one.
    pub status_location: Option<String>,
}

impl OperationHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_location: None,
        }
    }

    /// Attach a status location (URL or `{operationId}` template).
    pub fn with_status_location(mut self, location: impl Into<String>) -> Self {
        self.status_location = Some(location.into());
        self
    }
}

/// Durable snapshot of a handle whose operation is still being tracked.
///
/// Written when polling starts and cleared once the operation resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedHandle {
    pub handle: OperationHandle,
    /// Remote state at the time of the last save.
    pub state: crate::status::RunState,
    pub saved_at: Timestamp,
}

impl PersistedHandle {
    pub fn new(handle: OperationHandle, state: crate::status::RunState) -> Self {
        Self {
            handle,
            state,
            saved_at: chrono::Utc::now(),
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.handle.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RunState;

    #[test]
    fn persisted_handle_serializes_snake_case_state() {
        let handle = OperationHandle::new("exec-1").with_status_location("http://h/s/{operationId}");
        let persisted = PersistedHandle::new(handle, RunState::Running);

        let json = serde_json::to_value(&persisted).unwrap();
        assert_eq!(json["handle"]["id"], "exec-1");
        assert_eq!(json["handle"]["status_location"], "http://h/s/{operationId}");
        assert_eq!(json["state"], "running");

        let back: PersistedHandle = serde_json::from_value(json).unwrap();
        assert_eq!(back, persisted);
    }
}
