//! Price oracle: the catalog's current price for a product.
//!
//! Checkout never trusts a client-supplied or cached price. Prices are
//! quoted through a [`PriceOracle`] right before the checkout transaction
//! opens, with each lookup bounded by a timeout, so no transaction is held
//! open across a slow catalog call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cartwright_core::{Price, ProductId, Quantity};

use crate::error::{CheckoutError, Result};
use crate::models::{CheckoutLine, Product};
use crate::store::{Store, StoreTx};

/// Read-only lookup of a product's current unit price.
pub trait PriceOracle: Send + Sync {
    /// Current price of an active product; `None` if the product is unknown
    /// or inactive.
    fn active_price(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Option<Price>>> + Send;
}

/// [`PriceOracle`] reading the `products` table of a [`Store`] in its own
/// short read-only transaction.
#[derive(Debug)]
pub struct CatalogPriceOracle<S> {
    store: Arc<S>,
}

impl<S> CatalogPriceOracle<S> {
    /// Create an oracle over a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: Store> PriceOracle for CatalogPriceOracle<S> {
    async fn active_price(&self, product_id: ProductId) -> Result<Option<Price>> {
        let mut tx = self.store.begin().await?;
        let product = tx.product(product_id).await?;
        tx.rollback().await?;
        Ok(product.filter(|p| p.is_active).map(|p| p.price))
    }
}

/// One checkout line with its frozen unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotedLine {
    /// Product to buy.
    pub product_id: ProductId,
    /// Units to buy.
    pub quantity: Quantity,
    /// Price quoted by the oracle.
    pub unit_price: Price,
}

/// Quote every line through `oracle`.
///
/// # Errors
///
/// Returns `CheckoutError::PriceLookupTimeout` if a lookup exceeds `timeout`,
/// `CheckoutError::ProductNotFound` if a product is unknown or inactive, or
/// whatever error the oracle itself reports.
pub async fn quote_prices<P: PriceOracle>(
    oracle: &P,
    lines: &[CheckoutLine],
    timeout: Duration,
) -> Result<Vec<QuotedLine>> {
    let mut quotes = Vec::with_capacity(lines.len());
    for line in lines {
        let lookup = tokio::time::timeout(timeout, oracle.active_price(line.product_id)).await;
        let Ok(price) = lookup else {
            tracing::warn!(
                product_id = %line.product_id,
                timeout_ms = timeout.as_millis(),
                "price lookup timed out"
            );
            return Err(CheckoutError::PriceLookupTimeout(line.product_id));
        };
        let unit_price = price?.ok_or(CheckoutError::ProductNotFound(line.product_id))?;
        quotes.push(QuotedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price,
        });
    }
    Ok(quotes)
}

/// Look up a product inside an open transaction, treating inactive products
/// as absent.
pub(crate) async fn active_product<T: StoreTx>(tx: &mut T, product_id: ProductId) -> Result<Product> {
    match tx.product(product_id).await? {
        Some(product) if product.is_active => Ok(product),
        _ => Err(CheckoutError::ProductNotFound(product_id)),
    }
}
