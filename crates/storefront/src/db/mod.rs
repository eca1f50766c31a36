//! Local durable store backed by `SQLite`.
//!
//! # Tables
//!
//! - `cart_items` - one row per product in the local cart
//! - `sync_operations` - operation log of cart mutations awaiting remote acknowledgment
//! - `caches` / `cache_entries` - named response caches for the offline worker
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/`, embedded in the
//! binary, and applied at startup or via:
//! ```bash
//! cargo run -p pwa-commerce-cli -- migrate
//! ```

pub mod cache;
pub mod cart;
pub mod operations;

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use thiserror::Error;

pub use cache::{CacheRepository, StoredResponse};
pub use cart::CartRepository;
pub use operations::OperationLog;

/// Errors that can occur in the local durable store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Storage unavailable or the transaction was aborted.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations could not be applied.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Data in the store could not be converted back into a domain value.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Create a `SQLite` connection pool for the local store.
///
/// The database file is created when missing. The pool holds a single
/// connection: `SQLite` serialises writers anyway, and one connection keeps
/// appends, snapshots and deletes strictly ordered.
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the file cannot be opened.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Create a pool over a private in-memory database.
///
/// The single connection is never recycled, since dropping it would discard
/// the database.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be opened.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Apply the embedded migrations.
///
/// # Errors
///
/// Returns `PersistenceError::Migration` if a migration fails.
pub async fn migrate(pool: &SqlitePool) -> Result<(), PersistenceError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Check that the store answers queries.
///
/// # Errors
///
/// Returns `PersistenceError::Database` if the query fails.
pub async fn ping(pool: &SqlitePool) -> Result<(), PersistenceError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    #[allow(clippy::unwrap_used)]
    let pool = memory_pool().await.unwrap();
    #[allow(clippy::unwrap_used)]
    migrate(&pool).await.unwrap();
    pool
}
