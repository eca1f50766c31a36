//! PWA Commerce Core - Shared types library.
//!
//! This crate provides the domain types used across all PWA Commerce components:
//! - `storefront` - Product listing, local cart, offline worker and cart sync
//! - `cli` - Command-line tools for migrations and sync queue management
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Products, cart lines, sync operations, prices, identifiers and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
