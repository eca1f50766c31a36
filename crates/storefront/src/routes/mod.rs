//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Product listing with cart summary
//! GET  /health                    - Health check
//! GET  /health/ready              - Local store reachable
//! GET  /manifest.webmanifest      - Web app manifest
//!
//! # API
//! GET  /api/products              - Catalog
//! GET  /api/cart                  - Cart items and summary
//! POST /api/cart/add              - Add to cart (and request a flush while online)
//! GET  /api/sync/pending          - Operations awaiting delivery
//! POST /api/sync                  - Register a background sync
//! GET  /api/connectivity          - Current connectivity
//! POST /api/connectivity          - Report an online/offline signal
//! GET  /api/events                - Server-sent events for live pages
//! POST /api/push                  - Deliver a push message
//! GET  /api/push/options          - Push subscription options
//! POST /api/notifications/click   - Notification click
//!
//! # Everything else
//! *    /{*path}                   - Offline-aware proxy to the asset origin
//! ```

pub mod api;
pub mod events;
pub mod home;
pub mod manifest;
pub mod proxy;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::get,
};

use crate::db;
use crate::state::AppState;

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/manifest.webmanifest", get(manifest::webmanifest))
        .nest("/api", api::routes())
        .fallback(proxy::fetch)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the local store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match db::ping(state.pool()).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
