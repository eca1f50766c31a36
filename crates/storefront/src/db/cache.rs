//! Named response cache repository.
//!
//! Caches are listed in creation order, which is also the order
//! `find_any` searches them in.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use super::PersistenceError;

/// A response as stored in a named cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    url: String,
    status: i64,
    content_type: Option<String>,
    body: Vec<u8>,
    stored_at: i64,
}

impl TryFrom<EntryRow> for StoredResponse {
    type Error = PersistenceError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let status = u16::try_from(row.status).map_err(|_| {
            PersistenceError::DataCorruption(format!(
                "cache entry {}: status {} out of range",
                row.url, row.status
            ))
        })?;
        let stored_at = DateTime::from_timestamp_millis(row.stored_at).ok_or_else(|| {
            PersistenceError::DataCorruption(format!(
                "cache entry {}: timestamp {} out of range",
                row.url, row.stored_at
            ))
        })?;

        Ok(Self {
            url: row.url,
            status,
            content_type: row.content_type,
            body: row.body,
            stored_at,
        })
    }
}

/// Repository over the `caches` and `cache_entries` tables.
pub struct CacheRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CacheRepository<'a> {
    /// Create a new cache repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the named cache if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the insert fails.
    pub async fn open(&self, name: &str) -> Result<(), PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        ensure_cache(&mut conn, name).await
    }

    /// Whether a cache with this name exists.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the query fails.
    pub async fn exists(&self, name: &str) -> Result<bool, PersistenceError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM caches WHERE name = ?1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Names of all caches in creation order.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the query fails.
    pub async fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        let names = sqlx::query_scalar("SELECT name FROM caches ORDER BY created_at ASC, rowid ASC")
            .fetch_all(self.pool)
            .await?;
        Ok(names)
    }

    /// Delete a cache and every entry in it. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the delete fails.
    pub async fn delete(&self, name: &str) -> Result<bool, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cache_entries WHERE cache_name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM caches WHERE name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    /// Store one response, replacing any previous entry for the same URL.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the write fails.
    pub async fn put(&self, name: &str, response: &StoredResponse) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        ensure_cache(&mut tx, name).await?;
        insert_entry(&mut tx, name, response).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Store a batch of responses in one transaction: all or none.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if any write fails.
    pub async fn put_all(
        &self,
        name: &str,
        responses: &[StoredResponse],
    ) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        ensure_cache(&mut tx, name).await?;
        for response in responses {
            insert_entry(&mut tx, name, response).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Look up a URL in one cache.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the query fails.
    /// Returns `PersistenceError::DataCorruption` if the stored row is invalid.
    pub async fn get(
        &self,
        name: &str,
        url: &str,
    ) -> Result<Option<StoredResponse>, PersistenceError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r"
            SELECT url, status, content_type, body, stored_at
            FROM cache_entries
            WHERE cache_name = ?1 AND url = ?2
            ",
        )
        .bind(name)
        .bind(url)
        .fetch_optional(self.pool)
        .await?;

        row.map(StoredResponse::try_from).transpose()
    }

    /// Look up a URL across all caches, oldest cache first.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the query fails.
    /// Returns `PersistenceError::DataCorruption` if the stored row is invalid.
    pub async fn find_any(&self, url: &str) -> Result<Option<StoredResponse>, PersistenceError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r"
            SELECT e.url, e.status, e.content_type, e.body, e.stored_at
            FROM cache_entries e
            JOIN caches c ON c.name = e.cache_name
            WHERE e.url = ?1
            ORDER BY c.created_at ASC, c.rowid ASC
            LIMIT 1
            ",
        )
        .bind(url)
        .fetch_optional(self.pool)
        .await?;

        row.map(StoredResponse::try_from).transpose()
    }
}

async fn ensure_cache(conn: &mut SqliteConnection, name: &str) -> Result<(), PersistenceError> {
    sqlx::query("INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)")
        .bind(name)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    name: &str,
    response: &StoredResponse,
) -> Result<(), PersistenceError> {
    sqlx::query(
        r"
        INSERT OR REPLACE INTO cache_entries (cache_name, url, status, content_type, body, stored_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
    )
    .bind(name)
    .bind(response.url.as_str())
    .bind(i64::from(response.status))
    .bind(response.content_type.as_deref())
    .bind(response.body.as_slice())
    .bind(response.stored_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn response(url: &str, body: &str) -> StoredResponse {
        StoredResponse {
            url: url.to_owned(),
            status: 200,
            content_type: Some("text/plain".to_owned()),
            body: body.as_bytes().to_vec(),
            stored_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let pool = test_pool().await;
        let repo = CacheRepository::new(&pool);

        repo.put("v1", &response("http://o/a", "one")).await.unwrap();
        repo.put("v1", &response("http://o/a", "two")).await.unwrap();

        let found = repo.get("v1", "http://o/a").await.unwrap().unwrap();
        assert_eq!(found.body, b"two");
        assert!(repo.get("v2", "http://o/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_any_prefers_oldest_cache() {
        let pool = test_pool().await;
        let repo = CacheRepository::new(&pool);

        repo.put("old", &response("http://o/a", "old")).await.unwrap();
        repo.put("new", &response("http://o/a", "new")).await.unwrap();

        let found = repo.find_any("http://o/a").await.unwrap().unwrap();
        assert_eq!(found.body, b"old");
        assert_eq!(repo.keys().await.unwrap(), ["old", "new"]);
    }

    #[tokio::test]
    async fn test_delete_removes_entries() {
        let pool = test_pool().await;
        let repo = CacheRepository::new(&pool);

        repo.put("v1", &response("http://o/a", "one")).await.unwrap();
        assert!(repo.delete("v1").await.unwrap());
        assert!(!repo.delete("v1").await.unwrap());
        assert!(!repo.exists("v1").await.unwrap());
        assert!(repo.find_any("http://o/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let pool = test_pool().await;
        let repo = CacheRepository::new(&pool);

        repo.open("v1").await.unwrap();
        repo.open("v1").await.unwrap();
        assert_eq!(repo.keys().await.unwrap(), ["v1"]);
    }
}
