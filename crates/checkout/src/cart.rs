//! Cart store.
//!
//! Stock checks here are advisory: nothing is reserved until checkout, so
//! two shoppers may both be told an item is in stock. The reservation at
//! checkout is the arbiter.

use cartwright_core::{ProductId, Quantity, UserId};

use crate::error::{CheckoutError, Result};
use crate::inventory::InventoryLedger;
use crate::models::{Cart, CartItem, CartLine};
use crate::pricing::active_product;
use crate::store::StoreTx;

/// Cart operations scoped to one open transaction.
pub struct CartStore<'t, T> {
    tx: &'t mut T,
}

impl<'t, T: StoreTx> CartStore<'t, T> {
    /// Create a cart view over `tx`.
    #[must_use]
    pub const fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }

    /// Return the user's cart, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn get_or_create_cart(&mut self, user_id: UserId) -> Result<Cart> {
        Ok(self.tx.get_or_create_cart(user_id).await?)
    }

    /// Add `delta` units of a product, creating the line or growing it.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductNotFound` if the product is unknown or
    /// inactive, and `CheckoutError::InsufficientStock` if the line would
    /// exceed available stock (`requested` is the resulting line quantity).
    pub async fn add_or_increment(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        delta: Quantity,
    ) -> Result<CartItem> {
        active_product(&mut *self.tx, product_id).await?;

        let in_cart = match self.tx.find_cart(user_id).await? {
            Some(cart) => self
                .tx
                .cart_item(cart.id, product_id)
                .await?
                .map_or(0, |item| item.quantity.get()),
            None => 0,
        };
        let requested = in_cart.saturating_add(delta.get());
        let available = InventoryLedger::new(&mut *self.tx)
            .available(product_id)
            .await?;
        if requested > available {
            tracing::warn!(
                user_id = %user_id,
                product_id = %product_id,
                in_cart,
                delta = delta.get(),
                available,
                "cart add rejected"
            );
            return Err(CheckoutError::InsufficientStock {
                product_id,
                available,
                requested,
            });
        }

        let cart = self.tx.get_or_create_cart(user_id).await?;
        let item = self.tx.add_cart_item(cart.id, product_id, delta).await?;
        tracing::debug!(
            cart_id = %cart.id,
            product_id = %product_id,
            in_cart,
            delta = delta.get(),
            "cart line updated"
        );
        Ok(item)
    }

    /// Remove one unit of a product. A line reaching zero is deleted.
    ///
    /// Returns the new quantity; decrementing an absent line returns 0.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn decrement(&mut self, user_id: UserId, product_id: ProductId) -> Result<i32> {
        let Some(cart) = self.tx.find_cart(user_id).await? else {
            return Ok(0);
        };
        let remaining = self.tx.decrement_cart_item(cart.id, product_id).await?;
        tracing::debug!(
            cart_id = %cart.id,
            product_id = %product_id,
            remaining,
            "cart line decremented"
        );
        Ok(remaining)
    }

    /// Delete a product's line. Returns whether a line was removed.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn remove(&mut self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let Some(cart) = self.tx.find_cart(user_id).await? else {
            return Ok(false);
        };
        Ok(self.tx.delete_cart_item(cart.id, product_id).await?)
    }

    /// Cart lines with live product data, most recently added first.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn list(&mut self, user_id: UserId) -> Result<Vec<CartLine>> {
        match self.tx.find_cart(user_id).await? {
            Some(cart) => Ok(self.tx.cart_lines(cart.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Empty the user's cart. Returns the number of lines deleted.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn clear(&mut self, user_id: UserId) -> Result<u64> {
        match self.tx.find_cart(user_id).await? {
            Some(cart) => Ok(self.tx.clear_cart(cart.id).await?),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartwright_core::Price;

    use super::*;
    use crate::store::{MemoryStore, Store};
    use crate::testing;

    fn qty(n: i32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let user = testing::user();
        let mut tx = store.begin().await.unwrap();
        let mut carts = CartStore::new(&mut tx);

        let first = carts.get_or_create_cart(user).await.unwrap();
        let second = carts.get_or_create_cart(user).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_add_then_increment_keeps_one_line() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let user = testing::user();
        let mut tx = store.begin().await.unwrap();
        let mut carts = CartStore::new(&mut tx);

        carts.add_or_increment(user, id, qty(2)).await.unwrap();
        let item = carts.add_or_increment(user, id, qty(3)).await.unwrap();
        assert_eq!(item.quantity.get(), 5);

        let lines = carts.list(user).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].display_total().unwrap().to_string(), "50.00");
    }

    #[tokio::test]
    async fn test_add_counts_quantity_already_in_cart() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let user = testing::user();
        let mut tx = store.begin().await.unwrap();
        let mut carts = CartStore::new(&mut tx);

        carts.add_or_increment(user, id, qty(4)).await.unwrap();
        let err = carts.add_or_increment(user, id, qty(2)).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { available: 5, requested: 6, .. }
        ));
    }

    #[tokio::test]
    async fn test_add_rejects_inactive_and_unknown_products() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let user = testing::user();
        let mut tx = store.begin().await.unwrap();
        tx.update_product(id, Price::ZERO, false).await.unwrap();
        let mut carts = CartStore::new(&mut tx);

        for product in [id, ProductId::new(404)] {
            let err = carts.add_or_increment(user, product, qty(1)).await.unwrap_err();
            assert!(matches!(err, CheckoutError::ProductNotFound(p) if p == product));
        }
    }

    #[tokio::test]
    async fn test_decrement_is_idempotent() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let user = testing::user();
        let mut tx = store.begin().await.unwrap();
        let mut carts = CartStore::new(&mut tx);

        assert_eq!(carts.decrement(user, id).await.unwrap(), 0);

        carts.add_or_increment(user, id, qty(2)).await.unwrap();
        assert_eq!(carts.decrement(user, id).await.unwrap(), 1);
        assert_eq!(carts.decrement(user, id).await.unwrap(), 0);
        assert!(carts.list(user).await.unwrap().is_empty());
        assert_eq!(carts.decrement(user, id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_reports_absence() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let user = testing::user();
        let mut tx = store.begin().await.unwrap();
        let mut carts = CartStore::new(&mut tx);

        assert!(!carts.remove(user, id).await.unwrap());
        carts.add_or_increment(user, id, qty(1)).await.unwrap();
        assert!(carts.remove(user, id).await.unwrap());
        assert!(!carts.remove(user, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first() {
        let store = MemoryStore::new();
        let older = testing::product(&store, "1.00", 5).await;
        let newer = testing::product(&store, "2.00", 5).await;
        let user = testing::user();
        let mut tx = store.begin().await.unwrap();
        let mut carts = CartStore::new(&mut tx);

        carts.add_or_increment(user, older, qty(1)).await.unwrap();
        carts.add_or_increment(user, newer, qty(1)).await.unwrap();
        let products: Vec<ProductId> = carts
            .list(user)
            .await
            .unwrap()
            .iter()
            .map(|line| line.product.id)
            .collect();
        assert_eq!(products, vec![newer, older]);

        assert_eq!(carts.clear(user).await.unwrap(), 2);
        assert!(carts.list(user).await.unwrap().is_empty());
    }
}
