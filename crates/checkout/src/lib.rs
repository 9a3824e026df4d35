//! Cartwright Checkout - the cart-to-order transactional core.
//!
//! Turns a per-user mutable cart into a durable order while keeping product
//! stock counts consistent under concurrent access.
//!
//! # Architecture
//!
//! - [`store`] - Storage seam ([`Store`]/[`StoreTx`]) with `PostgreSQL` and in-memory engines
//! - [`inventory`] - Inventory ledger: availability, conditional reservation, release
//! - [`cart`] - Cart store: per-user cart lines with advisory stock checks
//! - [`pricing`] - Price oracle contract and the catalog-backed implementation
//! - [`orders`] - Order assembler: the checkout state machine and cancellation
//! - [`service`] - [`CheckoutService`] facade running each operation in one transaction
//!
//! Components are thin views over one open transaction; the facade owns the
//! transaction boundary and the retry policy.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod error;
pub mod inventory;
pub mod models;
pub mod orders;
pub mod pricing;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{CheckoutConfig, ConfigError, PoolConfig, TransactionSettings};
pub use error::{CheckoutError, ErrorKind, Result};
pub use pricing::{CatalogPriceOracle, PriceOracle};
pub use service::CheckoutService;
pub use store::{MemoryStore, PgStore, Store, StoreError, StoreTx};
