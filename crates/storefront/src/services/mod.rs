//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `cart` - Atomic add-to-cart over the local cart and the operation log
//! - `catalog` - Product catalog loading with an offline copy

pub mod cart;
pub mod catalog;

pub use cart::{CartAddition, CartError, CartService};
pub use catalog::{CatalogError, CatalogService};
