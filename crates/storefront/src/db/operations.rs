//! Operation log repository.
//!
//! Every cart mutation is recorded here until the remote endpoint acknowledges
//! it. Ids come from `AUTOINCREMENT`, so readers always observe operations in
//! strictly increasing id order and ids are never reused.

use chrono::DateTime;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use pwa_commerce_core::{NewSyncOperation, ProductId, SyncOperation, SyncOperationId};

use super::PersistenceError;

/// Upper bound on bound parameters per `DELETE ... IN` statement.
const DELETE_CHUNK: usize = 500;

#[derive(sqlx::FromRow)]
struct OperationRow {
    id: SyncOperationId,
    kind: String,
    product_id: String,
    quantity: i64,
    timestamp: i64,
}

impl TryFrom<OperationRow> for SyncOperation {
    type Error = PersistenceError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        let kind = row.kind.parse().map_err(|e| {
            PersistenceError::DataCorruption(format!("operation {}: {e}", row.id))
        })?;
        let product_id = ProductId::parse(&row.product_id).map_err(|e| {
            PersistenceError::DataCorruption(format!("operation {}: {e}", row.id))
        })?;
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            PersistenceError::DataCorruption(format!(
                "operation {}: quantity {} out of range",
                row.id, row.quantity
            ))
        })?;
        let timestamp = DateTime::from_timestamp_millis(row.timestamp).ok_or_else(|| {
            PersistenceError::DataCorruption(format!(
                "operation {}: timestamp {} out of range",
                row.id, row.timestamp
            ))
        })?;

        Ok(Self {
            id: row.id,
            kind,
            product_id,
            quantity,
            timestamp,
        })
    }
}

/// Repository over the `sync_operations` table.
pub struct OperationLog<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OperationLog<'a> {
    /// Create a new operation log repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an operation in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the insert fails. Nothing is
    /// stored in that case.
    pub async fn append(
        &self,
        operation: NewSyncOperation,
    ) -> Result<SyncOperation, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        append_in(&mut conn, operation).await
    }

    /// All pending operations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the query fails.
    /// Returns `PersistenceError::DataCorruption` if a stored row is invalid.
    pub async fn list_pending(&self) -> Result<Vec<SyncOperation>, PersistenceError> {
        let rows = sqlx::query_as::<_, OperationRow>(
            r"
            SELECT id, kind, product_id, quantity, timestamp
            FROM sync_operations
            ORDER BY id ASC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(SyncOperation::try_from).collect()
    }

    /// Delete the given operations. Ids that are already gone are ignored.
    ///
    /// Returns the number of rows actually removed.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the delete fails.
    pub async fn remove_confirmed(&self, ids: &[SyncOperationId]) -> Result<u64, PersistenceError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;

        for chunk in ids.chunks(DELETE_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM sync_operations WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            removed += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Empty the log. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the delete fails.
    pub async fn clear_all(&self) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM sync_operations")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of pending operations.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the query fails.
    pub async fn count(&self) -> Result<u64, PersistenceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_operations")
            .fetch_one(self.pool)
            .await?;
        u64::try_from(count)
            .map_err(|_| PersistenceError::DataCorruption(format!("negative row count {count}")))
    }
}

/// Append an operation on a caller-owned connection or transaction.
///
/// # Errors
///
/// Returns `PersistenceError::Database` if the insert fails.
pub async fn append_in(
    conn: &mut SqliteConnection,
    operation: NewSyncOperation,
) -> Result<SyncOperation, PersistenceError> {
    let id: SyncOperationId = sqlx::query_scalar(
        r"
        INSERT INTO sync_operations (kind, product_id, quantity, timestamp)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING id
        ",
    )
    .bind(operation.kind.as_str())
    .bind(operation.product_id.as_str())
    .bind(i64::from(operation.quantity))
    .bind(operation.timestamp.timestamp_millis())
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(operation_id = %id, product_id = %operation.product_id, "operation appended");

    Ok(operation.with_id(id))
}
