//! Local store migrations.
//!
//! # Usage
//!
//! ```bash
//! pc-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `SQLite` URL of the local store (fallback `DATABASE_URL`)
//!
//! # Migration Files
//!
//! `crates/storefront/migrations/`, embedded in the storefront library.

use super::{CommandError, open_store};

/// Apply the embedded migrations to the local store.
pub async fn run() -> Result<(), CommandError> {
    let pool = open_store().await?;
    pool.close().await;

    tracing::info!("Local store migrations complete!");
    Ok(())
}
