//! CLI command implementations.

pub mod migrate;
pub mod queue;

use sqlx::SqlitePool;
use thiserror::Error;

use pwa_commerce_storefront::config::ConfigError;
use pwa_commerce_storefront::db::{self, PersistenceError};

/// Errors that can occur running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// The local store failed.
    #[error("Local store error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Storefront configuration is incomplete.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Output could not be encoded.
    #[error("Output error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Database URL from `STOREFRONT_DATABASE_URL`, then `DATABASE_URL`, then the
/// storefront default.
fn database_url() -> String {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap_or_else(|_| "sqlite://pwa-commerce.db".to_owned())
}

/// Open the local store and bring its schema up to date.
async fn open_store() -> Result<SqlitePool, CommandError> {
    let url = database_url();
    tracing::info!("Opening local store {url}");

    let pool = db::create_pool(&url).await?;
    db::migrate(&pool).await?;
    Ok(pool)
}
