//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use pwa_commerce_core::{CartItem, CartSummary, Product};

use crate::state::AppState;

/// Product display data for templates.
#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub price: String,
    pub original_price: Option<String>,
    pub discount: Option<String>,
    pub photo_url: Option<String>,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.product_id.to_string(),
            name: product.name.clone(),
            category: product.category.clone(),
            price: product.selling_price().display(),
            original_price: product.list_price().map(|p| p.display()),
            discount: product.discount.clone(),
            photo_url: product.photo_url.clone(),
        }
    }
}

/// Cart line display data for templates.
#[derive(Debug, Clone)]
pub struct CartLineView {
    pub name: String,
    pub quantity: u32,
    pub line_total: String,
}

impl From<&CartItem> for CartLineView {
    fn from(item: &CartItem) -> Self {
        Self {
            name: item.name.clone(),
            quantity: item.quantity,
            line_total: item.line_total().display(),
        }
    }
}

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub products: Vec<ProductView>,
    /// Set when neither the origin nor the cache had a catalog.
    pub catalog_unavailable: bool,
    pub cart: Vec<CartLineView>,
    pub subtotal: String,
    pub online: bool,
}

/// Display the product listing with the cart summary.
#[instrument(skip(state))]
pub async fn home(State(state): State<AppState>) -> impl IntoResponse {
    let (products, catalog_unavailable) = match state.catalog().products().await {
        Ok(products) => (products.iter().map(ProductView::from).collect(), false),
        Err(e) => {
            tracing::error!("Failed to load catalog: {e}");
            (Vec::new(), true)
        }
    };

    let items = state.cart().get_cart_items().await.unwrap_or_else(|e| {
        tracing::error!("Failed to load cart: {e}");
        Vec::new()
    });
    let summary = CartSummary::from_items(&items);

    HomeTemplate {
        products,
        catalog_unavailable,
        cart: items.iter().map(CartLineView::from).collect(),
        subtotal: summary.subtotal.display(),
        online: state.monitor().current().is_online(),
    }
}
