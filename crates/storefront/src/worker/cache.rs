//! Named response caches, durable in `SQLite`.
//!
//! Writes made after a response has already been handed back run as a
//! [`CacheWrite`]: the caller either awaits it or explicitly detaches it.
//! A detached write gives no ordering guarantee against later reads, and its
//! failure is only logged.

use std::future::Future;

use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::oneshot;

use super::fetch::FetchResponse;
use crate::db::{CacheRepository, PersistenceError};

/// Errors that can occur in cache storage.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying store failed.
    #[error("cache storage error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The write task ended without reporting a result.
    #[error("cache write aborted")]
    Aborted,
}

/// All named caches.
#[derive(Clone)]
pub struct CacheStorage {
    pool: SqlitePool,
}

impl CacheStorage {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the named cache, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Persistence` if the cache cannot be created.
    pub async fn open(&self, name: &str) -> Result<Cache, CacheError> {
        CacheRepository::new(&self.pool).open(name).await?;
        Ok(Cache {
            name: name.to_owned(),
            pool: self.pool.clone(),
        })
    }

    /// Whether the named cache exists.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Persistence` if the store cannot be read.
    pub async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(CacheRepository::new(&self.pool).exists(name).await?)
    }

    /// Names of all caches, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Persistence` if the store cannot be read.
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(CacheRepository::new(&self.pool).keys().await?)
    }

    /// Delete the named cache. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Persistence` if the delete fails.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(CacheRepository::new(&self.pool).delete(name).await?)
    }

    /// Look `url` up in every cache, oldest cache first.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Persistence` if the store cannot be read.
    pub async fn match_any(&self, url: &str) -> Result<Option<FetchResponse>, CacheError> {
        let found = CacheRepository::new(&self.pool).find_any(url).await?;
        Ok(found.map(FetchResponse::from))
    }
}

/// One named cache.
#[derive(Clone)]
pub struct Cache {
    name: String,
    pool: SqlitePool,
}

impl Cache {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `response` under `url`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Persistence` if the write fails.
    pub async fn put(&self, url: &str, response: &FetchResponse) -> Result<(), CacheError> {
        CacheRepository::new(&self.pool)
            .put(&self.name, &response.to_stored(url))
            .await?;
        Ok(())
    }

    /// Store every entry, or none of them.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Persistence` if any write fails.
    pub async fn add_all(&self, entries: &[(String, FetchResponse)]) -> Result<(), CacheError> {
        let stored: Vec<_> = entries
            .iter()
            .map(|(url, response)| response.to_stored(url))
            .collect();
        CacheRepository::new(&self.pool)
            .put_all(&self.name, &stored)
            .await?;
        Ok(())
    }

    /// Look `url` up in this cache.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Persistence` if the store cannot be read.
    pub async fn match_url(&self, url: &str) -> Result<Option<FetchResponse>, CacheError> {
        let found = CacheRepository::new(&self.pool).get(&self.name, url).await?;
        Ok(found.map(FetchResponse::from))
    }

    /// Start storing `response` under `url` without waiting for it.
    pub fn put_in_background(&self, url: String, response: FetchResponse) -> CacheWrite {
        let cache = self.clone();
        let key = url.clone();
        CacheWrite::spawn(url, async move { cache.put(&key, &response).await })
    }
}

/// A cache update running in the background.
///
/// Await [`CacheWrite::wait`] to observe completion, or call
/// [`CacheWrite::detach`] to let it finish on its own.
#[must_use = "await `wait()` or call `detach()`"]
#[derive(Debug)]
pub struct CacheWrite {
    url: String,
    result: oneshot::Receiver<Result<(), CacheError>>,
}

impl CacheWrite {
    /// Run `write` on its own task.
    pub fn spawn<F>(url: String, write: F) -> Self
    where
        F: Future<Output = Result<(), CacheError>> + Send + 'static,
    {
        let (sender, result) = oneshot::channel();
        let task_url = url.clone();

        tokio::spawn(async move {
            let outcome = write.await;
            if let Err(Err(e)) = sender.send(outcome) {
                tracing::warn!(url = %task_url, error = %e, "detached cache write failed");
            }
        });

        Self { url, result }
    }

    /// The URL being written.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait for the write to finish.
    ///
    /// # Errors
    ///
    /// Returns the write's own error, or `CacheError::Aborted` if the task
    /// died first.
    pub async fn wait(self) -> Result<(), CacheError> {
        self.result.await.unwrap_or(Err(CacheError::Aborted))
    }

    /// Let the write finish unobserved. Failures are logged at `warn`.
    pub fn detach(self) {
        tracing::trace!(url = %self.url, "cache write detached");
        drop(self.result);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Bytes;
    use axum::http::StatusCode;

    use super::*;
    use crate::db::test_pool;
    use crate::worker::fetch::ResponseSource;

    fn response(body: &'static str) -> FetchResponse {
        FetchResponse {
            status: StatusCode::OK,
            content_type: Some("text/plain".to_owned()),
            body: Bytes::from_static(body.as_bytes()),
            source: ResponseSource::Network,
        }
    }

    #[tokio::test]
    async fn test_background_write_can_be_awaited() {
        let pool = test_pool().await;
        let cache = CacheStorage::new(pool).open("v1").await.unwrap();

        let write = cache.put_in_background("http://o/a".to_owned(), response("hello"));
        assert_eq!(write.url(), "http://o/a");
        write.wait().await.unwrap();

        let found = cache.match_url("http://o/a").await.unwrap().unwrap();
        assert_eq!(found.body, Bytes::from_static(b"hello"));
        assert_eq!(found.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_to_waiter() {
        let write = CacheWrite::spawn("http://o/a".to_owned(), async {
            Err::<(), _>(CacheError::Persistence(PersistenceError::DataCorruption(
                "boom".to_owned(),
            )))
        });
        assert!(matches!(write.wait().await, Err(CacheError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_add_all_is_atomic() {
        let pool = test_pool().await;
        let storage = CacheStorage::new(pool.clone());
        let cache = storage.open("v1").await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_b BEFORE INSERT ON cache_entries WHEN NEW.url = 'http://o/b' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let entries = vec![
            ("http://o/a".to_owned(), response("a")),
            ("http://o/b".to_owned(), response("b")),
        ];
        assert!(cache.add_all(&entries).await.is_err());
        assert!(cache.match_url("http://o/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_any_and_delete() {
        let pool = test_pool().await;
        let storage = CacheStorage::new(pool);
        let old = storage.open("v0").await.unwrap();
        old.put("http://o/a", &response("old")).await.unwrap();

        let found = storage.match_any("http://o/a").await.unwrap().unwrap();
        assert_eq!(found.body, Bytes::from_static(b"old"));

        assert!(storage.delete("v0").await.unwrap());
        assert!(!storage.has("v0").await.unwrap());
        assert!(storage.match_any("http://o/a").await.unwrap().is_none());
    }
}
