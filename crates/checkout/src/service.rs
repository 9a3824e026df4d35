//! Checkout facade.
//!
//! Every public operation opens one transaction, runs a component against
//! it and commits. When the store reports a retryable conflict the whole
//! operation is re-run from a fresh transaction, up to
//! [`TransactionSettings::max_attempts`] times.

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use cartwright_core::{OrderId, Price, ProductId, Quantity, StockStatus, UserId};

use crate::cart::CartStore;
use crate::config::TransactionSettings;
use crate::error::{CheckoutError, Result};
use crate::inventory::InventoryLedger;
use crate::models::{
    CartItem, CartLine, CheckoutLine, Inventory, NewProduct, Order, OrderDetails, OrderReceipt,
    Product, StockCheck, StockLevels,
};
use crate::orders::{OrderAssembler, validate_checkout};
use crate::pricing::{CatalogPriceOracle, PriceOracle, QuotedLine, quote_prices};
use crate::store::{Store, StoreTx};

/// The operations exposed to callers (HTTP handlers, CLI, tests).
pub struct CheckoutService<S, P> {
    store: Arc<S>,
    oracle: P,
    settings: TransactionSettings,
}

impl<S: Store> CheckoutService<S, CatalogPriceOracle<S>> {
    /// Create a service that reads prices from the same store.
    #[must_use]
    pub fn new(store: S, settings: TransactionSettings) -> Self {
        let store = Arc::new(store);
        let oracle = CatalogPriceOracle::new(Arc::clone(&store));
        Self {
            store,
            oracle,
            settings,
        }
    }
}

impl<S: Store, P: PriceOracle> CheckoutService<S, P> {
    /// Create a service with an external price oracle.
    #[must_use]
    pub const fn with_oracle(store: Arc<S>, oracle: P, settings: TransactionSettings) -> Self {
        Self {
            store,
            oracle,
            settings,
        }
    }

    /// Get the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// List the user's cart, most recently added first.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_cart(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        self.retrying("list_cart", || self.try_list_cart(user_id))
            .await
    }

    /// Add units of a product to the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductNotFound` or
    /// `CheckoutError::InsufficientStock`.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id, quantity = %quantity))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartItem> {
        self.retrying("add_to_cart", || {
            self.try_add_to_cart(user_id, product_id, quantity)
        })
        .await
    }

    /// Remove one unit of a product from the cart. Returns the new quantity.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn decrement_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<i32> {
        self.retrying("decrement_cart_item", || {
            self.try_decrement_cart_item(user_id, product_id)
        })
        .await
    }

    /// Remove a product's line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::CartItemNotFound` if the line does not exist.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn remove_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<()> {
        let removed = self
            .retrying("remove_cart_item", || {
                self.try_remove_cart_item(user_id, product_id)
            })
            .await?;
        if !removed {
            return Err(CheckoutError::CartItemNotFound(product_id));
        }
        Ok(())
    }

    // =========================================================================
    // Checkout and orders
    // =========================================================================

    /// Convert the submitted lines into an order.
    ///
    /// Prices are quoted before the transaction opens; the transaction then
    /// creates the order, empties the cart and reserves stock atomically.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart`, `CheckoutError::InvalidTotal`,
    /// `CheckoutError::ProductNotFound`, `CheckoutError::PriceLookupTimeout`,
    /// `CheckoutError::InsufficientStock`, `CheckoutError::PriceMismatch`, or
    /// `CheckoutError::Transaction` once retries are exhausted.
    #[instrument(skip(self, lines), fields(user_id = %user_id, lines = lines.len(), total = %total_amount))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        lines: &[CheckoutLine],
        total_amount: Decimal,
    ) -> Result<OrderReceipt> {
        validate_checkout(lines, total_amount)?;
        let quotes = quote_prices(&self.oracle, lines, self.settings.price_lookup_timeout).await?;

        let receipt = self
            .retrying("checkout", || {
                self.try_checkout(user_id, &quotes, total_amount)
            })
            .await?;
        tracing::info!(
            order_id = %receipt.order_id,
            total = %receipt.total_amount,
            "order created"
        );
        Ok(receipt)
    }

    /// Cancel one of the user's orders and release its stock.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` or
    /// `CheckoutError::InvalidTransition`.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn cancel_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self
            .retrying("cancel_order", || self.try_cancel_order(user_id, order_id))
            .await?;
        tracing::info!(order_id = %order.id, "order cancelled");
        Ok(order)
    }

    /// Read one of the user's orders with its lines.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if the order is absent or owned
    /// by someone else.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn order(&self, user_id: UserId, order_id: OrderId) -> Result<OrderDetails> {
        self.retrying("order", || self.try_order(user_id, order_id))
            .await
    }

    /// The user's orders, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.retrying("orders", || self.try_orders(user_id)).await
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    /// Units of a product that can still be reserved.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn available(&self, product_id: ProductId) -> Result<i32> {
        self.retrying("available", || self.try_available(product_id))
            .await
    }

    /// Stock report for an active product.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductNotFound` if the product is unknown or
    /// inactive.
    #[instrument(skip(self), fields(product_id = %product_id, requested = %requested))]
    pub async fn check_stock(&self, product_id: ProductId, requested: Quantity) -> Result<StockCheck> {
        self.retrying("check_stock", || self.try_check_stock(product_id, requested))
            .await
    }

    /// Set a product's stock counters, keeping existing reservations.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidStockLevels` or
    /// `CheckoutError::ProductNotFound`.
    #[instrument(skip(self, levels), fields(product_id = %product_id, quantity = levels.quantity))]
    pub async fn stock_product(&self, product_id: ProductId, levels: StockLevels) -> Result<Inventory> {
        self.retrying("stock_product", || {
            self.try_stock_product(product_id, levels.clone())
        })
        .await
    }

    /// Number of active products at or below their low-water mark.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    #[instrument(skip(self))]
    pub async fn low_stock_count(&self) -> Result<i64> {
        self.retrying("low_stock_count", || self.try_low_stock_count())
            .await
    }

    /// Display classification of a product's stock.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductNotFound` if the product is unknown or
    /// inactive.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn stock_status(&self, product_id: ProductId) -> Result<StockStatus> {
        self.retrying("stock_status", || self.try_stock_status(product_id))
            .await
    }

    // =========================================================================
    // Catalog maintenance (seeding and tooling)
    // =========================================================================

    /// Insert a product, optionally with initial stock, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidStockLevels` if `stock` is invalid.
    #[instrument(skip(self, product, stock), fields(title = %product.title))]
    pub async fn add_product(
        &self,
        product: NewProduct,
        stock: Option<StockLevels>,
    ) -> Result<Product> {
        let created = self
            .retrying("add_product", || {
                self.try_add_product(product.clone(), stock.clone())
            })
            .await?;
        tracing::info!(product_id = %created.id, "product created");
        Ok(created)
    }

    /// Change a product's price and active flag.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductNotFound` if the product does not exist.
    #[instrument(skip(self), fields(product_id = %product_id, price = %price))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        price: Price,
        is_active: bool,
    ) -> Result<()> {
        let updated = self
            .retrying("update_product", || {
                self.try_update_product(product_id, price, is_active)
            })
            .await?;
        if !updated {
            return Err(CheckoutError::ProductNotFound(product_id));
        }
        Ok(())
    }

    // =========================================================================
    // Transaction bodies
    // =========================================================================

    /// Run `attempt` until it succeeds, fails for a non-retryable reason, or
    /// `max_attempts` is reached.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut tries = 1;
        loop {
            match attempt().await {
                Err(CheckoutError::Transaction(err)) if err.is_retryable() && tries < max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt = tries,
                        max_attempts,
                        error = %err,
                        "retrying after storage conflict"
                    );
                    tries += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_list_cart(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let mut tx = self.store.begin().await?;
        let lines = CartStore::new(&mut tx).list(user_id).await?;
        tx.commit().await?;
        Ok(lines)
    }

    async fn try_add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartItem> {
        let mut tx = self.store.begin().await?;
        let item = CartStore::new(&mut tx)
            .add_or_increment(user_id, product_id, quantity)
            .await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn try_decrement_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<i32> {
        let mut tx = self.store.begin().await?;
        let remaining = CartStore::new(&mut tx)
            .decrement(user_id, product_id)
            .await?;
        tx.commit().await?;
        Ok(remaining)
    }

    async fn try_remove_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let removed = CartStore::new(&mut tx).remove(user_id, product_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn try_checkout(
        &self,
        user_id: UserId,
        quotes: &[QuotedLine],
        total_amount: Decimal,
    ) -> Result<OrderReceipt> {
        let mut tx = self.store.begin().await?;
        let receipt = OrderAssembler::new(&mut tx)
            .assemble(user_id, quotes, total_amount)
            .await?;
        tx.commit().await?;
        Ok(receipt)
    }

    async fn try_cancel_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let order = OrderAssembler::new(&mut tx).cancel(user_id, order_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn try_order(&self, user_id: UserId, order_id: OrderId) -> Result<OrderDetails> {
        let mut tx = self.store.begin().await?;
        let details = OrderAssembler::new(&mut tx).find(user_id, order_id).await?;
        tx.commit().await?;
        Ok(details)
    }

    async fn try_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        let orders = OrderAssembler::new(&mut tx).list(user_id).await?;
        tx.commit().await?;
        Ok(orders)
    }

    async fn try_available(&self, product_id: ProductId) -> Result<i32> {
        let mut tx = self.store.begin().await?;
        let available = InventoryLedger::new(&mut tx).available(product_id).await?;
        tx.commit().await?;
        Ok(available)
    }

    async fn try_check_stock(&self, product_id: ProductId, requested: Quantity) -> Result<StockCheck> {
        let mut tx = self.store.begin().await?;
        let check = InventoryLedger::new(&mut tx)
            .check(product_id, requested)
            .await?;
        tx.commit().await?;
        Ok(check)
    }

    async fn try_stock_product(&self, product_id: ProductId, levels: StockLevels) -> Result<Inventory> {
        let mut tx = self.store.begin().await?;
        let inventory = InventoryLedger::new(&mut tx)
            .stock(levels.for_product(product_id))
            .await?;
        tx.commit().await?;
        Ok(inventory)
    }

    async fn try_low_stock_count(&self) -> Result<i64> {
        let mut tx = self.store.begin().await?;
        let count = InventoryLedger::new(&mut tx).low_stock_count().await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn try_stock_status(&self, product_id: ProductId) -> Result<StockStatus> {
        let mut tx = self.store.begin().await?;
        let status = InventoryLedger::new(&mut tx).stock_status(product_id).await?;
        tx.commit().await?;
        Ok(status)
    }

    async fn try_add_product(
        &self,
        product: NewProduct,
        stock: Option<StockLevels>,
    ) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let created = tx.insert_product(product).await?;
        if let Some(levels) = stock {
            InventoryLedger::new(&mut tx)
                .stock(levels.for_product(created.id))
                .await?;
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn try_update_product(
        &self,
        product_id: ProductId,
        price: Price,
        is_active: bool,
    ) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let updated = tx.update_product(product_id, price, is_active).await?;
        tx.commit().await?;
        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use cartwright_core::OrderStatus;

    use super::*;
    use crate::error::ErrorKind;
    use crate::store::{MemoryStore, StoreError};
    use crate::testing;

    fn service(store: &MemoryStore) -> CheckoutService<MemoryStore, CatalogPriceOracle<MemoryStore>> {
        CheckoutService::new(store.clone(), TransactionSettings::default())
    }

    fn line(product_id: ProductId, quantity: i32) -> CheckoutLine {
        CheckoutLine::new(product_id, Quantity::new(quantity).unwrap())
    }

    #[tokio::test]
    async fn test_checkout_retries_conflicts() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let checkout = service(&store);

        store.conflict_next_commits(2);
        let receipt = checkout
            .checkout(testing::user(), &[line(id, 2)], Decimal::new(20, 0))
            .await
            .unwrap();
        assert_eq!(receipt.status, OrderStatus::Processing);
        assert_eq!(testing::reserved(&store, id).await, 2);
    }

    #[tokio::test]
    async fn test_checkout_gives_up_after_max_attempts() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let checkout = service(&store);

        store.conflict_next_commits(3);
        let err = checkout
            .checkout(testing::user(), &[line(id, 2)], Decimal::new(20, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Transaction(StoreError::SerializationConflict)
        ));
        assert_eq!(err.kind(), ErrorKind::TransactionFailure);
        assert_eq!(testing::reserved(&store, id).await, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_is_not_retried() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let checkout = service(&store);
        let user = testing::user();
        checkout.add_to_cart(user, id, Quantity::ONE).await.unwrap();

        store.fail_next_commit();
        let err = checkout
            .checkout(user, &[line(id, 1)], Decimal::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Transaction(StoreError::Aborted(_))));
        assert!(err.is_retryable());
        assert_eq!(checkout.list_cart(user).await.unwrap().len(), 1);
        assert_eq!(testing::reserved(&store, id).await, 0);
    }

    #[tokio::test]
    async fn test_checkout_rejects_inactive_product_before_transaction() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let checkout = service(&store);
        checkout
            .update_product(id, "10.00".parse().unwrap(), false)
            .await
            .unwrap();

        let err = checkout
            .checkout(testing::user(), &[line(id, 1)], Decimal::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(p) if p == id));
    }

    #[tokio::test]
    async fn test_slow_oracle_aborts_checkout() {
        struct Stalled;

        impl PriceOracle for Stalled {
            async fn active_price(&self, _product_id: ProductId) -> Result<Option<Price>> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(None)
            }
        }

        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let checkout = CheckoutService::with_oracle(
            Arc::new(store.clone()),
            Stalled,
            TransactionSettings {
                max_attempts: 3,
                price_lookup_timeout: Duration::from_millis(20),
            },
        );

        let err = checkout
            .checkout(testing::user(), &[line(id, 1)], Decimal::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::PriceLookupTimeout(p) if p == id));
        assert_eq!(testing::reserved(&store, id).await, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_item_is_not_found() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let checkout = service(&store);

        let err = checkout
            .remove_cart_item(testing::user(), id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::CartItemNotFound(p) if p == id));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_add_product_with_stock() {
        let store = MemoryStore::new();
        let checkout = service(&store);

        let product = checkout
            .add_product(
                NewProduct {
                    title: "Pineapple".to_owned(),
                    price: "3.50".parse().unwrap(),
                    is_active: true,
                },
                Some(StockLevels {
                    quantity: 4,
                    min_stock_level: 5,
                    max_stock_level: 20,
                    cost_price: None,
                }),
            )
            .await
            .unwrap();

        assert_eq!(checkout.available(product.id).await.unwrap(), 4);
        assert_eq!(
            checkout.stock_status(product.id).await.unwrap(),
            StockStatus::LowStock
        );
        assert_eq!(checkout.low_stock_count().await.unwrap(), 1);

        let err = checkout
            .add_product(
                NewProduct {
                    title: "Broken".to_owned(),
                    price: Price::ZERO,
                    is_active: true,
                },
                Some(StockLevels {
                    quantity: -1,
                    ..StockLevels::default()
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidStockLevels(_)));
    }
}
