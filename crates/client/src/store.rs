//! Durable storage for handles of operations still being tracked.
//!
//! A [`HandleStore`] is injected into a poll session so that tracking
//! can resume after a restart. The loop itself never depends on one:
//! sessions built without a store simply skip persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hooktrack_core::error::{PollError, PollErrorKind};
use hooktrack_core::types::PersistedHandle;
use tokio::sync::{Mutex, RwLock};

/// Errors from a handle store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// Persistence contract for tracked handles.
///
/// Records are keyed by operation id so several operations can be in
/// flight at once; with a single operation this is the plain
/// save / load / clear slot.
#[async_trait]
pub trait HandleStore: Send + Sync {
    /// Insert or replace the record for `record.handle.id`.
    async fn save(&self, record: &PersistedHandle) -> Result<(), StoreError>;

    /// The most recently saved record, if any.
    async fn load(&self) -> Result<Option<PersistedHandle>, StoreError>;

    /// Every stored record, oldest first.
    async fn pending(&self) -> Result<Vec<PersistedHandle>, StoreError>;

    /// Remove the record for `operation_id`. Removing an absent record is
    /// not an error.
    async fn clear(&self, operation_id: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// ClearPolicy
// ---------------------------------------------------------------------------

/// When a persisted handle is removed after a session resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearPolicy {
    /// Clear once the remote operation is known to be over: on success
    /// and on remote failure. Timeouts, attempt caps, cancellation and
    /// missing wiring keep the record so the operation can be resumed.
    #[default]
    Finished,
    /// Clear on every outcome.
    Always,
    /// Clear only on success; failed operations stay for inspection.
    SuccessOnly,
}

impl ClearPolicy {
    pub fn should_clear<T>(&self, outcome: &Result<T, PollError>) -> bool {
        match (self, outcome) {
            (_, Ok(_)) => true,
            (ClearPolicy::Always, Err(_)) => true,
            (ClearPolicy::SuccessOnly, Err(_)) => false,
            (ClearPolicy::Finished, Err(e)) => e.kind() == PollErrorKind::Remote,
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryHandleStore
// ---------------------------------------------------------------------------

/// In-process store. Survives nothing; useful for tests and embedding.
#[derive(Default)]
pub struct MemoryHandleStore {
    records: RwLock<Vec<PersistedHandle>>,
}

impl MemoryHandleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HandleStore for MemoryHandleStore {
    async fn save(&self, record: &PersistedHandle) -> Result<(), StoreError> {
        upsert(&mut *self.records.write().await, record);
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedHandle>, StoreError> {
        Ok(self.records.read().await.last().cloned())
    }

    async fn pending(&self) -> Result<Vec<PersistedHandle>, StoreError> {
        Ok(self.records.read().await.clone())
    }

    async fn clear(&self, operation_id: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .retain(|r| r.operation_id() != operation_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileHandleStore
// ---------------------------------------------------------------------------

/// Store backed by a JSON file holding an array of records.
///
/// Writes go to a sibling temp file that is then renamed over the
/// original, so a crash mid-write never leaves a truncated file.
pub struct FileHandleStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileHandleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<PersistedHandle>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, records: &[PersistedHandle]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl HandleStore for FileHandleStore {
    async fn save(&self, record: &PersistedHandle) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        upsert(&mut records, record);
        self.write_all(&records).await
    }

    async fn load(&self) -> Result<Option<PersistedHandle>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.pop())
    }

    async fn pending(&self) -> Result<Vec<PersistedHandle>, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    async fn clear(&self, operation_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        let before = records.len();
        records.retain(|r| r.operation_id() != operation_id);
        if records.len() == before {
            return Ok(());
        }
        self.write_all(&records).await
    }
}

/// Replace any record with the same id and move it to the end.
fn upsert(records: &mut Vec<PersistedHandle>, record: &PersistedHandle) {
    records.retain(|r| r.operation_id() != record.operation_id());
    records.push(record.clone());
}

#[cfg(test)]
mod tests {
    use hooktrack_core::status::RunState;
    use hooktrack_core::types::OperationHandle;

    use super::*;

    fn record(id: &str) -> PersistedHandle {
        PersistedHandle::new(
            OperationHandle::new(id).with_status_location(format!("https://h/status/{id}")),
            RunState::Running,
        )
    }

    #[test]
    fn clear_policy_matrix() {
        let remote: Result<(), PollError> = Err(PollError::Remote {
            operation_id: Some("a".into()),
            message: "x".into(),
        });
        let cancelled: Result<(), PollError> = Err(PollError::Cancelled {
            operation_id: "a".into(),
        });
        let ok: Result<(), PollError> = Ok(());

        assert!(ClearPolicy::Finished.should_clear(&ok));
        assert!(ClearPolicy::Finished.should_clear(&remote));
        assert!(!ClearPolicy::Finished.should_clear(&cancelled));

        assert!(ClearPolicy::Always.should_clear(&cancelled));
        assert!(!ClearPolicy::SuccessOnly.should_clear(&remote));
        assert!(ClearPolicy::SuccessOnly.should_clear(&ok));
    }

    #[tokio::test]
    async fn memory_store_keeps_latest_last() {
        let store = MemoryHandleStore::new();
        store.save(&record("a")).await.unwrap();
        store.save(&record("b")).await.unwrap();
        store.save(&record("a")).await.unwrap();

        assert_eq!(store.load().await.unwrap().unwrap().operation_id(), "a");
        let ids: Vec<_> = store
            .pending()
            .await
            .unwrap()
            .iter()
            .map(|r| r.operation_id().to_string())
            .collect();
        assert_eq!(ids, ["b", "a"]);

        store.clear("a").await.unwrap();
        store.clear("missing").await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().operation_id(), "b");
    }

    #[tokio::test]
    async fn file_store_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("handles.json");

        let store = FileHandleStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
        store.save(&record("exec-1")).await.unwrap();
        store.save(&record("exec-2")).await.unwrap();

        let reopened = FileHandleStore::new(&path);
        let latest = reopened.load().await.unwrap().unwrap();
        assert_eq!(latest.operation_id(), "exec-2");
        assert_eq!(
            latest.handle.status_location.as_deref(),
            Some("https://h/status/exec-2")
        );

        reopened.clear("exec-2").await.unwrap();
        reopened.clear("exec-2").await.unwrap();
        assert_eq!(store.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handles.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = FileHandleStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Serialization(_))));
    }
}
