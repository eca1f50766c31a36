//! Local cart service.
//!
//! Adding to the cart writes the cart line and the matching sync operation in
//! one `SQLite` transaction, so both are stored or neither is.

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::instrument;

use pwa_commerce_core::{CartItem, CartSummary, NewSyncOperation, Product, SyncOperation};

use crate::db::{CartRepository, PersistenceError, cart, operations};

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity must be at least one.
    #[error("invalid quantity {0}: must be at least 1")]
    InvalidQuantity(u32),

    /// The line would hold more than `u32::MAX` units.
    #[error("quantity overflow for product {product_id}: {current} + {added}")]
    QuantityOverflow {
        product_id: String,
        current: u64,
        added: u32,
    },

    /// The local store rejected the write or read.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<sqlx::Error> for CartError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(PersistenceError::Database(err))
    }
}

/// Result of a successful add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartAddition {
    /// The cart line after the increment.
    pub item: CartItem,
    /// The operation queued for delivery.
    pub operation: SyncOperation,
}

/// Cart service over the local store.
pub struct CartService<'a> {
    pool: &'a SqlitePool,
    items: CartRepository<'a>,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self {
            pool,
            items: CartRepository::new(pool),
        }
    }

    /// Add `quantity` of `product` to the cart and queue the matching
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if `quantity` is zero.
    /// Returns `CartError::QuantityOverflow` if the line would exceed
    /// `u32::MAX`; nothing is written.
    /// Returns `CartError::Persistence` if the transaction fails; nothing is
    /// committed in that case.
    #[instrument(skip(self, product), fields(product_id = %product.product_id))]
    pub async fn add_to_cart(
        &self,
        product: &Product,
        quantity: u32,
    ) -> Result<CartAddition, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }

        let now = Utc::now();
        let line = CartItem::new(product, quantity, now);
        let pending = NewSyncOperation::add_to_cart(product.product_id.clone(), quantity, now);

        let mut tx = self.pool.begin().await?;
        let current = cart::quantity_in(&mut tx, &product.product_id).await?;
        if u32::try_from(current + u64::from(quantity)).is_err() {
            return Err(CartError::QuantityOverflow {
                product_id: product.product_id.to_string(),
                current,
                added: quantity,
            });
        }
        let item = cart::upsert_in(&mut tx, &line).await?;
        let operation = operations::append_in(&mut tx, pending).await?;
        tx.commit().await?;

        tracing::info!(
            operation_id = %operation.id,
            quantity = item.quantity,
            "item added to cart"
        );

        Ok(CartAddition { item, operation })
    }

    /// All cart lines, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Persistence` if the store cannot be read.
    pub async fn get_cart_items(&self) -> Result<Vec<CartItem>, CartError> {
        Ok(self.items.list().await?)
    }

    /// Line count, total quantity and subtotal of the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Persistence` if the store cannot be read.
    pub async fn summary(&self) -> Result<CartSummary, CartError> {
        let items = self.get_cart_items().await?;
        Ok(CartSummary::from_items(&items))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use pwa_commerce_core::ProductId;

    use super::*;
    use crate::db::{OperationLog, test_pool};

    fn product(id: &str) -> Product {
        Product {
            product_id: ProductId::parse(id).unwrap(),
            name: format!("Part {id}"),
            category: None,
            price: Decimal::new(999, 2),
            original_price: None,
            discount: None,
            description: String::new(),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn test_add_to_empty_cart() {
        let pool = test_pool().await;
        let service = CartService::new(&pool);

        let added = service.add_to_cart(&product("a"), 2).await.unwrap();
        assert_eq!(added.item.quantity, 2);
        assert_eq!(added.operation.quantity, 2);

        let items = service.get_cart_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id.as_str(), "a");
        assert_eq!(items[0].quantity, 2);
        assert_eq!(OperationLog::new(&pool).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_quantities_accumulate_per_product() {
        let pool = test_pool().await;
        let service = CartService::new(&pool);

        let calls = [("a", 1), ("b", 3), ("a", 4), ("a", 2), ("b", 1)];
        for (id, quantity) in calls {
            service.add_to_cart(&product(id), quantity).await.unwrap();
        }

        let items = service.get_cart_items().await.unwrap();
        let quantity_of = |id: &str| {
            items
                .iter()
                .find(|i| i.product_id.as_str() == id)
                .map(|i| i.quantity)
        };
        assert_eq!(quantity_of("a"), Some(7));
        assert_eq!(quantity_of("b"), Some(4));

        let pending = OperationLog::new(&pool).list_pending().await.unwrap();
        let logged: Vec<_> = pending
            .iter()
            .map(|o| (o.product_id.as_str(), o.quantity))
            .collect();
        assert_eq!(logged, calls);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let pool = test_pool().await;
        let service = CartService::new(&pool);

        let err = service.add_to_cart(&product("a"), 0).await.unwrap_err();
        assert!(matches!(err, CartError::InvalidQuantity(0)));
        assert!(service.get_cart_items().await.unwrap().is_empty());
        assert_eq!(OperationLog::new(&pool).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_quantity_overflow_rejected_without_writing() {
        let pool = test_pool().await;
        let service = CartService::new(&pool);
        service.add_to_cart(&product("a"), u32::MAX).await.unwrap();

        let err = service.add_to_cart(&product("a"), 1).await.unwrap_err();
        assert!(matches!(
            err,
            CartError::QuantityOverflow { current, added: 1, .. } if current == u64::from(u32::MAX)
        ));

        let items = service.get_cart_items().await.unwrap();
        assert_eq!(items[0].quantity, u32::MAX);
        assert_eq!(OperationLog::new(&pool).count().await.unwrap(), 1);

        // Other products are unaffected
        service.add_to_cart(&product("b"), 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_append_rolls_back_cart_line() {
        let pool = test_pool().await;
        sqlx::query("DROP TABLE sync_operations")
            .execute(&pool)
            .await
            .unwrap();

        let service = CartService::new(&pool);
        let err = service.add_to_cart(&product("a"), 1).await.unwrap_err();
        assert!(matches!(err, CartError::Persistence(_)));
        assert!(service.get_cart_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summary() {
        let pool = test_pool().await;
        let service = CartService::new(&pool);
        service.add_to_cart(&product("a"), 2).await.unwrap();
        service.add_to_cart(&product("b"), 1).await.unwrap();

        let summary = service.summary().await.unwrap();
        assert_eq!(summary.line_count, 2);
        assert_eq!(summary.total_quantity, 3);
        assert_eq!(summary.subtotal.display(), "$29.97");
    }
}
