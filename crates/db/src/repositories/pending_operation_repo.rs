//! Repository for the `pending_operations` table.

use hooktrack_core::types::PersistedHandle;
use sqlx::PgPool;

use crate::models::pending_operation::PendingOperation;

/// Column list for `pending_operations` queries.
const COLUMNS: &str = "operation_id, status_location, state, saved_at, created_at, updated_at";

/// Provides query operations for persisted handles.
pub struct PendingOperationRepo;

impl PendingOperationRepo {
    /// Insert a handle, or refresh it when the operation is already stored.
    pub async fn upsert(
        pool: &PgPool,
        record: &PersistedHandle,
    ) -> Result<PendingOperation, sqlx::Error> {
        let query = format!(
            "INSERT INTO pending_operations (operation_id, status_location, state, saved_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (operation_id) DO UPDATE SET \
                 status_location = EXCLUDED.status_location, \
                 state = EXCLUDED.state, \
                 saved_at = EXCLUDED.saved_at, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingOperation>(&query)
            .bind(&record.handle.id)
            .bind(record.handle.status_location.as_deref())
            .bind(record.state.as_str())
            .bind(record.saved_at)
            .fetch_one(pool)
            .await
    }

    /// The most recently saved handle.
    pub async fn latest(pool: &PgPool) -> Result<Option<PendingOperation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_operations \
             ORDER BY saved_at DESC, updated_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, PendingOperation>(&query)
            .fetch_optional(pool)
            .await
    }

    /// All stored handles, oldest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<PendingOperation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_operations ORDER BY saved_at ASC, updated_at ASC"
        );
        sqlx::query_as::<_, PendingOperation>(&query)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        operation_id: &str,
    ) -> Result<Option<PendingOperation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pending_operations WHERE operation_id = $1");
        sqlx::query_as::<_, PendingOperation>(&query)
            .bind(operation_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a handle. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, operation_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_operations WHERE operation_id = $1")
            .bind(operation_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
