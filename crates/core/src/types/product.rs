//! Catalog product types.
//!
//! Products are sourced from a static, read-only catalog file and are never
//! mutated locally.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::Price;

/// Errors that can occur when parsing a [`ProductId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductIdError {
    /// The input string is empty (or only whitespace).
    #[error("product id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("product id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// Identifier of a catalog product.
///
/// Catalog files use both JSON strings and JSON numbers for product IDs, so
/// deserialization accepts either and normalizes to the string form.
///
/// ```
/// use pwa_commerce_core::ProductId;
///
/// let from_number: ProductId = serde_json::from_str("17").unwrap();
/// let from_string: ProductId = serde_json::from_str("\"17\"").unwrap();
/// assert_eq!(from_number, from_string);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Maximum length of a product ID.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a product ID, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ProductIdError`] if the ID is empty or too long.
    pub fn parse(s: &str) -> Result<Self, ProductIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ProductIdError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(ProductIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProductId {
    type Err = ProductIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        let raw = match RawId::deserialize(deserializer)? {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        };
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A product from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog identifier.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Category label.
    #[serde(default)]
    pub category: Option<String>,
    /// Current selling price.
    pub price: Decimal,
    /// Price before discount.
    #[serde(default)]
    pub original_price: Option<Decimal>,
    /// Discount label (e.g., "20%").
    #[serde(default)]
    pub discount: Option<String>,
    /// Long description.
    #[serde(default)]
    pub description: String,
    /// Image reference.
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Product {
    /// Selling price in the store currency.
    #[must_use]
    pub fn selling_price(&self) -> Price {
        Price::usd(self.price)
    }

    /// Pre-discount price, if the catalog lists one.
    #[must_use]
    pub fn list_price(&self) -> Option<Price> {
        self.original_price.map(Price::usd)
    }
}
