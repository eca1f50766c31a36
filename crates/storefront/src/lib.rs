//! PWA Commerce storefront library.
//!
//! An offline-first storefront: the cart lives in a local `SQLite` store, every
//! add is also appended to a durable operation log, and a background worker
//! drains that log to the remote cart endpoint whenever connectivity returns.
//! Static assets and the catalog are served through an offline worker that
//! falls back to its caches.
//!
//! This crate provides the storefront as a library so the binary, the CLI
//! and the integration tests share it.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod sync;
pub mod worker;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router with its middleware stack.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(middleware::make_request_span))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
