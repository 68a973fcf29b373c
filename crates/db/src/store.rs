//! [`HandleStore`] backed by the `pending_operations` table.

use async_trait::async_trait;
use hooktrack_client::store::{HandleStore, StoreError};
use hooktrack_core::types::PersistedHandle;

use crate::models::pending_operation::PendingOperation;
use crate::repositories::PendingOperationRepo;
use crate::DbPool;

/// Persists handles in Postgres so any process sharing the database can
/// resume them.
#[derive(Clone)]
pub struct PgHandleStore {
    pool: DbPool,
}

impl PgHandleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
impl HandleStore for PgHandleStore {
    async fn save(&self, record: &PersistedHandle) -> Result<(), StoreError> {
        PendingOperationRepo::upsert(&self.pool, record)
            .await
            .map_err(db_error)?;
        tracing::debug!(operation_id = %record.handle.id, "Persisted handle");
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedHandle>, StoreError> {
        let row = PendingOperationRepo::latest(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(PendingOperation::into_persisted))
    }

    async fn pending(&self) -> Result<Vec<PersistedHandle>, StoreError> {
        let rows = PendingOperationRepo::list(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(PendingOperation::into_persisted).collect())
    }

    async fn clear(&self, operation_id: &str) -> Result<(), StoreError> {
        let removed = PendingOperationRepo::delete(&self.pool, operation_id)
            .await
            .map_err(db_error)?;
        if removed {
            tracing::debug!(operation_id, "Cleared persisted handle");
        }
        Ok(())
    }
}
