//! Catalog and cart endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pwa_commerce_core::{CartItem, CartSummary, Product, ProductId, SyncOperation};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;
use crate::sync::FlushRequest;

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Cart contents and totals.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub summary: CartSummary,
}

/// Result of an add.
#[derive(Debug, Serialize)]
pub struct AddToCartResponse {
    pub item: CartItem,
    pub operation: SyncOperation,
    pub summary: CartSummary,
    /// Set when the add asked for a flush.
    pub flush: Option<FlushRequest>,
}

/// List the catalog.
#[instrument(skip(state))]
pub async fn products(State(state): State<AppState>) -> Result<Json<Arc<Vec<Product>>>> {
    Ok(Json(state.catalog().products().await?))
}

/// Show the cart.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>) -> Result<Json<CartResponse>> {
    let items = state.cart().get_cart_items().await?;
    let summary = CartSummary::from_items(&items);
    Ok(Json(CartResponse { items, summary }))
}

/// Add a product to the cart.
///
/// The cart line and its sync operation are stored together. While online a
/// flush is requested afterwards; a failed request does not undo the add.
#[instrument(skip(state, request), fields(product_id = %request.product_id))]
pub async fn add(
    State(state): State<AppState>,
    Json(request): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<AddToCartResponse>)> {
    let product = state
        .catalog()
        .find(&request.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", request.product_id)))?;

    let cart = state.cart();
    let addition = cart
        .add_to_cart(&product, request.quantity.unwrap_or(1))
        .await?;
    let summary = cart.summary().await?;

    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", product.product_id.as_str())]),
    );

    let flush = if state.monitor().current().is_online() {
        match state.scheduler().request_flush().await {
            Ok(request) => Some(request),
            Err(e) => {
                tracing::warn!(error = %e, "flush after add failed");
                None
            }
        }
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(AddToCartResponse {
            item: addition.item,
            operation: addition.operation,
            summary,
            flush,
        }),
    ))
}
