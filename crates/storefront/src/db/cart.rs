//! Cart repository.

use std::str::FromStr;

use chrono::DateTime;
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};

use pwa_commerce_core::{CartItem, ProductId};

use super::PersistenceError;

#[derive(sqlx::FromRow)]
struct CartRow {
    product_id: String,
    name: String,
    price: String,
    quantity: i64,
    added_at: i64,
}

impl TryFrom<CartRow> for CartItem {
    type Error = PersistenceError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let corrupt = |what: String| {
            PersistenceError::DataCorruption(format!("cart item {}: {what}", row.product_id))
        };

        let product_id = ProductId::parse(&row.product_id).map_err(|e| corrupt(e.to_string()))?;
        let price = Decimal::from_str(&row.price)
            .map_err(|e| corrupt(format!("invalid price {:?}: {e}", row.price)))?;
        let quantity = u32::try_from(row.quantity)
            .map_err(|_| corrupt(format!("quantity {} out of range", row.quantity)))?;
        let added_at = DateTime::from_timestamp_millis(row.added_at)
            .ok_or_else(|| corrupt(format!("timestamp {} out of range", row.added_at)))?;

        Ok(Self {
            product_id,
            name: row.name,
            price,
            quantity,
            added_at,
        })
    }
}

/// Repository over the `cart_items` table.
pub struct CartRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// All cart lines ordered by `added_at`, then product id.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the query fails.
    /// Returns `PersistenceError::DataCorruption` if a stored row is invalid.
    pub async fn list(&self) -> Result<Vec<CartItem>, PersistenceError> {
        let rows = sqlx::query_as::<_, CartRow>(
            r"
            SELECT product_id, name, price, quantity, added_at
            FROM cart_items
            ORDER BY added_at ASC, product_id ASC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(CartItem::try_from).collect()
    }

    /// Get a single cart line.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the query fails.
    /// Returns `PersistenceError::DataCorruption` if the stored row is invalid.
    pub async fn get(&self, product_id: &ProductId) -> Result<Option<CartItem>, PersistenceError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT product_id, name, price, quantity, added_at
            FROM cart_items
            WHERE product_id = ?1
            ",
        )
        .bind(product_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(CartItem::try_from).transpose()
    }
}

/// Quantity currently stored for `product_id`, zero when there is no line.
///
/// # Errors
///
/// Returns `PersistenceError::Database` if the query fails.
pub async fn quantity_in(
    conn: &mut SqliteConnection,
    product_id: &ProductId,
) -> Result<u64, PersistenceError> {
    let quantity: Option<i64> =
        sqlx::query_scalar("SELECT quantity FROM cart_items WHERE product_id = ?1")
            .bind(product_id.as_str())
            .fetch_optional(&mut *conn)
            .await?;

    Ok(quantity.and_then(|q| u64::try_from(q).ok()).unwrap_or(0))
}

/// Insert a cart line, or add `item.quantity` to the existing line.
///
/// An existing line keeps its name, price and `added_at`. Runs on a
/// caller-owned connection so it can share a transaction with the
/// operation log.
///
/// # Errors
///
/// Returns `PersistenceError::Database` if the upsert fails.
/// Returns `PersistenceError::DataCorruption` if the resulting row is invalid.
pub async fn upsert_in(
    conn: &mut SqliteConnection,
    item: &CartItem,
) -> Result<CartItem, PersistenceError> {
    let row = sqlx::query_as::<_, CartRow>(
        r"
        INSERT INTO cart_items (product_id, name, price, quantity, added_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (product_id) DO UPDATE SET quantity = cart_items.quantity + excluded.quantity
        RETURNING product_id, name, price, quantity, added_at
        ",
    )
    .bind(item.product_id.as_str())
    .bind(item.name.as_str())
    .bind(item.price.to_string())
    .bind(i64::from(item.quantity))
    .bind(item.added_at.timestamp_millis())
    .fetch_one(&mut *conn)
    .await?;

    CartItem::try_from(row)
}
