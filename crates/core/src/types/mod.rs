//! Core types for PWA Commerce.
//!
//! This module provides type-safe wrappers for the storefront's domain concepts.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;
pub mod status;
pub mod sync;

pub use cart::{CartItem, CartSummary};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use product::{Product, ProductId, ProductIdError};
pub use status::*;
pub use sync::{NewSyncOperation, OperationKind, SyncOperation};
