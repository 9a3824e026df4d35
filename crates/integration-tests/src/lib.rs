//! Integration tests for Cartwright checkout.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory engine only
//! cargo test -p cartwright-integration-tests
//!
//! # Also against PostgreSQL (migrations are applied automatically)
//! CHECKOUT_TEST_DATABASE_URL=postgres://localhost/cartwright_test \
//!     cargo test -p cartwright-integration-tests
//! ```
//!
//! # Layout
//!
//! - [`scenarios`] - engine-agnostic checks, each taking a [`Service`]
//! - `tests/memory.rs` - runs every scenario on [`MemoryStore`]
//! - `tests/postgres.rs` - runs them on [`PgStore`], skipped when no test
//!   database is configured
//!
//! Every scenario creates its own products and users, so scenarios can share
//! one database and run in parallel.

#![allow(clippy::missing_panics_doc)]

use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::SecretString;
use uuid::Uuid;

use cartwright_checkout::models::{NewProduct, StockLevels};
use cartwright_checkout::{
    CatalogPriceOracle, CheckoutService, MemoryStore, PgStore, PoolConfig, Store,
    TransactionSettings,
};
use cartwright_core::{Price, ProductId, Quantity, UserId};

pub mod scenarios;

/// Environment variable naming the `PostgreSQL` test database.
pub const TEST_DATABASE_URL: &str = "CHECKOUT_TEST_DATABASE_URL";

/// Checkout service reading prices from its own store.
pub type Service<S> = CheckoutService<S, CatalogPriceOracle<S>>;

/// Service over a fresh in-memory store.
#[must_use]
pub fn memory_service() -> Service<MemoryStore> {
    CheckoutService::new(MemoryStore::new(), TransactionSettings::default())
}

/// Service over the `PostgreSQL` test database, or `None` when
/// [`TEST_DATABASE_URL`] is not set.
pub async fn postgres_service() -> Option<Service<PgStore>> {
    let url = std::env::var(TEST_DATABASE_URL).ok()?;
    let pool = PoolConfig {
        max_connections: 16,
        min_connections: 0,
        ..PoolConfig::default()
    };
    let store = PgStore::connect(&pool, &SecretString::from(url))
        .await
        .expect("Failed to connect to test database");
    store.migrate().await.expect("Failed to run migrations");
    Some(CheckoutService::new(store, TransactionSettings::default()))
}

/// Parse a decimal literal.
#[must_use]
pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).expect("valid decimal literal")
}

/// Build a positive quantity.
#[must_use]
pub fn qty(value: i32) -> Quantity {
    Quantity::new(value).expect("positive quantity")
}

/// A user nobody else in the test run shares.
#[must_use]
pub fn fresh_user() -> UserId {
    UserId::random()
}

/// Insert an active product with `quantity` units on hand.
pub async fn stocked_product<S: Store>(
    service: &Service<S>,
    price: &str,
    quantity: i32,
) -> ProductId {
    let product = NewProduct {
        title: format!("Test product {}", Uuid::new_v4()),
        price: price.parse::<Price>().expect("valid price"),
        is_active: true,
    };
    let stock = StockLevels {
        quantity,
        max_stock_level: quantity,
        ..StockLevels::default()
    };
    service
        .add_product(product, Some(stock))
        .await
        .expect("Failed to create test product")
        .id
}

/// Overwrite on-hand stock, keeping reservations.
pub async fn set_stock<S: Store>(service: &Service<S>, product_id: ProductId, quantity: i32) {
    let stock = StockLevels {
        quantity,
        max_stock_level: quantity,
        ..StockLevels::default()
    };
    service
        .stock_product(product_id, stock)
        .await
        .expect("Failed to set stock");
}

/// Currently reserved units of an active product.
pub async fn reserved<S: Store>(service: &Service<S>, product_id: ProductId) -> i32 {
    service
        .check_stock(product_id, Quantity::ONE)
        .await
        .expect("Failed to check stock")
        .reserved
}

/// `(product, quantity)` pairs in the user's cart, most recent first.
pub async fn cart_contents<S: Store>(service: &Service<S>, user_id: UserId) -> Vec<(ProductId, i32)> {
    service
        .list_cart(user_id)
        .await
        .expect("Failed to list cart")
        .iter()
        .map(|line| (line.product.id, line.item.quantity.get()))
        .collect()
}
