//! Sync queue commands.
//!
//! # Usage
//!
//! ```bash
//! # List operations awaiting delivery
//! pc-cli pending
//!
//! # Deliver pending operations to the configured endpoint
//! pc-cli flush
//!
//! # Drop every pending operation
//! pc-cli clear
//! ```
//!
//! `flush` reads the full storefront configuration (`SYNC_ENDPOINT_URL`,
//! `SYNC_ENDPOINT_TOKEN`, `SYNC_DELIVERY_TIMEOUT_SECS`, ...).

use pwa_commerce_storefront::config::StorefrontConfig;
use pwa_commerce_storefront::db::OperationLog;
use pwa_commerce_storefront::events::EventBus;
use pwa_commerce_storefront::sync::{FlushWorker, HttpEndpoint};

use super::{CommandError, open_store};

/// Log every pending operation, oldest first.
pub async fn pending() -> Result<(), CommandError> {
    let pool = open_store().await?;
    let operations = OperationLog::new(&pool).list_pending().await?;

    tracing::info!("{} pending operation(s)", operations.len());
    for operation in &operations {
        tracing::info!("  {}", serde_json::to_string(operation)?);
    }

    pool.close().await;
    Ok(())
}

/// Run one flush against the configured endpoint.
pub async fn flush() -> Result<(), CommandError> {
    let config = StorefrontConfig::from_env()?;
    let pool = open_store().await?;

    let endpoint = HttpEndpoint::new(
        reqwest::Client::new(),
        config.sync.endpoint_url.clone(),
        config.sync.endpoint_token.clone(),
    );
    tracing::info!("Flushing to {}", endpoint.url());

    let worker = FlushWorker::new(
        pool.clone(),
        endpoint,
        EventBus::new(),
        config.sync.delivery_timeout,
    );
    let report = worker.run().await?;

    tracing::info!(
        "Delivered {}, remaining {}{}",
        report.delivered,
        report.remaining,
        if report.halted { " (halted on failure)" } else { "" }
    );

    pool.close().await;
    Ok(())
}

/// Remove every pending operation.
pub async fn clear() -> Result<(), CommandError> {
    let pool = open_store().await?;
    let removed = OperationLog::new(&pool).clear_all().await?;

    tracing::info!("Cleared {removed} pending operation(s)");

    pool.close().await;
    Ok(())
}
