//! JSON API used by the storefront page.

pub mod cart;
pub mod push;
pub mod sync;

use axum::{
    Router,
    routing::{get, post},
};

use super::events;
use crate::state::AppState;

/// Create the API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(cart::products))
        .route("/cart", get(cart::show))
        .route("/cart/add", post(cart::add))
        .route("/sync", post(sync::request_flush))
        .route("/sync/pending", get(sync::pending))
        .route("/connectivity", get(sync::connectivity).post(sync::report_connectivity))
        .route("/events", get(events::stream))
        .route("/push", post(push::inject))
        .route("/push/options", get(push::options))
        .route("/notifications/click", post(push::click))
}
