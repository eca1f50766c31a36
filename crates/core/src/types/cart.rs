//! Local cart line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Price, Product, ProductId};

/// A cart line, keyed by product.
///
/// There is exactly one line per product; adding a product that is already
/// in the cart increments `quantity` and leaves the other fields untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product this line refers to.
    pub product_id: ProductId,
    /// Product name at the time it was first added.
    pub name: String,
    /// Unit price at the time it was first added.
    pub price: Decimal,
    /// Accumulated quantity.
    pub quantity: u32,
    /// When the line was first created.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Build a fresh line for a product.
    #[must_use]
    pub fn new(product: &Product, quantity: u32, added_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product.product_id.clone(),
            name: product.name.clone(),
            price: product.price,
            quantity,
            added_at,
        }
    }

    /// Unit price in the store currency.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        Price::usd(self.price)
    }

    /// Price of the whole line (`price * quantity`).
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price().times(self.quantity)
    }
}

/// Totals shown next to the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    /// Number of distinct lines.
    pub line_count: usize,
    /// Sum of all line quantities.
    pub total_quantity: u64,
    /// Sum of all line totals.
    pub subtotal: Price,
}

impl CartSummary {
    /// Compute the summary of a set of cart lines.
    #[must_use]
    pub fn from_items(items: &[CartItem]) -> Self {
        let subtotal = items
            .iter()
            .map(|item| item.line_total().amount)
            .sum::<Decimal>();

        Self {
            line_count: items.len(),
            total_quantity: items.iter().map(|item| u64::from(item.quantity)).sum(),
            subtotal: Price::usd(subtotal),
        }
    }
}
