//! Pending cart mutations awaiting delivery to the remote cart endpoint.
//!
//! Every local cart mutation appends one [`SyncOperation`] to the durable
//! operation log. Entries leave the log only after the remote endpoint has
//! acknowledged them, so the log always holds (in application order) every
//! mutation not yet confirmed delivered.

use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProductId, SyncOperationId};

/// Kind of cart mutation carried by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// A product was added to the cart (quantity is the increment).
    AddToCart,
}

impl OperationKind {
    /// Wire/storage tag for the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AddToCart => "add-to-cart",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add-to-cart" => Ok(Self::AddToCart),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}

/// An operation about to be appended (no identifier yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSyncOperation {
    /// Mutation kind.
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// Product affected.
    pub product_id: ProductId,
    /// Quantity carried by the mutation.
    pub quantity: u32,
    /// When the mutation happened locally.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl NewSyncOperation {
    /// An add-to-cart mutation.
    #[must_use]
    pub fn add_to_cart(product_id: ProductId, quantity: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: OperationKind::AddToCart,
            product_id,
            quantity,
            timestamp,
        }
    }

    /// Attach the identifier assigned by the store.
    #[must_use]
    pub fn with_id(self, id: SyncOperationId) -> SyncOperation {
        SyncOperation {
            id,
            kind: self.kind,
            product_id: self.product_id,
            quantity: self.quantity,
            timestamp: self.timestamp,
        }
    }
}

/// An operation stored in the durable log.
///
/// Serializes to the body sent to the remote cart endpoint:
///
/// ```json
/// {"id": 1, "type": "add-to-cart", "product_id": "101", "quantity": 2, "timestamp": 1718000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Monotonically increasing identifier assigned on append.
    pub id: SyncOperationId,
    /// Mutation kind.
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// Product affected.
    pub product_id: ProductId,
    /// Quantity carried by the mutation.
    pub quantity: u32,
    /// When the mutation happened locally.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_operation_wire_format() {
        let timestamp = Utc.timestamp_millis_opt(1_718_000_000_000).unwrap();
        let op = NewSyncOperation::add_to_cart(ProductId::parse("101").unwrap(), 2, timestamp)
            .with_id(SyncOperationId::new(7));

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "type": "add-to-cart",
                "product_id": "101",
                "quantity": 2,
                "timestamp": 1_718_000_000_000_i64
            })
        );
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(
            "add-to-cart".parse::<OperationKind>(),
            Ok(OperationKind::AddToCart)
        );
        assert!("remove-from-cart".parse::<OperationKind>().is_err());
        assert_eq!(OperationKind::AddToCart.to_string(), "add-to-cart");
    }
}
