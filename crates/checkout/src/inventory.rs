//! Inventory ledger.
//!
//! The only writer of reservation state. Every method runs inside the
//! caller's transaction, so a reservation becomes visible exactly when the
//! order it protects does.

use cartwright_core::{Price, ProductId, Quantity, StockStatus};

use crate::error::{CheckoutError, Result};
use crate::models::{Inventory, NewInventory, StockCheck};
use crate::pricing::active_product;
use crate::store::StoreTx;

/// Inventory operations scoped to one open transaction.
pub struct InventoryLedger<'t, T> {
    tx: &'t mut T,
}

impl<'t, T: StoreTx> InventoryLedger<'t, T> {
    /// Create a ledger view over `tx`.
    #[must_use]
    pub const fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }

    /// Units that can still be reserved. A product without an inventory row
    /// is not stocked and has 0 available.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn available(&mut self, product_id: ProductId) -> Result<i32> {
        let inventory = self.tx.inventory(product_id).await?;
        Ok(inventory.as_ref().map_or(0, Inventory::available))
    }

    /// Report stock for an active product against a requested amount.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductNotFound` if the product is unknown or
    /// inactive.
    pub async fn check(&mut self, product_id: ProductId, requested: Quantity) -> Result<StockCheck> {
        active_product(&mut *self.tx, product_id).await?;
        let inventory = self.tx.inventory(product_id).await?;
        Ok(StockCheck::from_inventory(
            product_id,
            inventory.as_ref(),
            requested,
        ))
    }

    /// Reserve `amount` units.
    ///
    /// Check and increment are one conditional write, so two concurrent
    /// reservations can never together exceed the available stock.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InsufficientStock` with the currently
    /// available count if the reservation does not fit.
    pub async fn reserve(&mut self, product_id: ProductId, amount: Quantity) -> Result<()> {
        if self.tx.try_reserve(product_id, amount).await? {
            tracing::debug!(product_id = %product_id, amount = amount.get(), "stock reserved");
            return Ok(());
        }

        let available = self.available(product_id).await?;
        tracing::warn!(
            product_id = %product_id,
            available,
            requested = amount.get(),
            "reservation rejected"
        );
        Err(CheckoutError::InsufficientStock {
            product_id,
            available,
            requested: amount.get(),
        })
    }

    /// Give back `amount` reserved units, never going below zero.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn release(&mut self, product_id: ProductId, amount: Quantity) -> Result<()> {
        if !self.tx.release(product_id, amount).await? {
            tracing::debug!(product_id = %product_id, "release on unstocked product ignored");
        }
        Ok(())
    }

    /// Create or overwrite a product's stock counters.
    ///
    /// Reserved units are kept; the new on-hand quantity must cover them.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidStockLevels` for negative counts,
    /// `min > max`, a cost that is not a valid price, or a quantity below the
    /// reserved amount.
    /// Returns `CheckoutError::ProductNotFound` if the product does not exist.
    pub async fn stock(&mut self, levels: NewInventory) -> Result<Inventory> {
        validate_levels(&levels)?;
        let product_id = levels.product_id;
        if self.tx.product(product_id).await?.is_none() {
            return Err(CheckoutError::ProductNotFound(product_id));
        }

        let reserved = self
            .tx
            .inventory(product_id)
            .await?
            .map_or(0, |row| row.reserved_quantity);
        if levels.quantity < reserved {
            return Err(CheckoutError::InvalidStockLevels(format!(
                "quantity {} is below the {reserved} units already reserved",
                levels.quantity
            )));
        }

        let inventory = self.tx.put_inventory(levels).await?;
        tracing::info!(
            product_id = %product_id,
            quantity = inventory.quantity,
            reserved = inventory.reserved_quantity,
            "stock set"
        );
        Ok(inventory)
    }

    /// Number of active products running low.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn low_stock_count(&mut self) -> Result<i64> {
        Ok(self.tx.low_stock_count().await?)
    }

    /// Display classification of an active product's stock.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductNotFound` if the product is unknown or
    /// inactive.
    pub async fn stock_status(&mut self, product_id: ProductId) -> Result<StockStatus> {
        active_product(&mut *self.tx, product_id).await?;
        let inventory = self.tx.inventory(product_id).await?;
        Ok(inventory
            .as_ref()
            .map_or(StockStatus::OutOfStock, Inventory::stock_status))
    }
}

fn validate_levels(levels: &NewInventory) -> Result<()> {
    if levels.quantity < 0 {
        return Err(CheckoutError::InvalidStockLevels(format!(
            "quantity cannot be negative (got {})",
            levels.quantity
        )));
    }
    if levels.min_stock_level < 0 {
        return Err(CheckoutError::InvalidStockLevels(format!(
            "min stock level cannot be negative (got {})",
            levels.min_stock_level
        )));
    }
    if levels.max_stock_level < levels.min_stock_level {
        return Err(CheckoutError::InvalidStockLevels(format!(
            "max stock level {} is below min stock level {}",
            levels.max_stock_level, levels.min_stock_level
        )));
    }
    if let Some(cost) = levels.cost_price {
        // same column domain as a selling price
        Price::new(cost)
            .map_err(|e| CheckoutError::InvalidStockLevels(format!("cost price: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartwright_core::Price;
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::StockLevels;
    use crate::store::{MemoryStore, Store};
    use crate::testing;

    fn qty(n: i32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_available_is_zero_without_row() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(&mut tx);
        assert_eq!(ledger.available(ProductId::new(77)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reserve_reports_available_on_failure() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 3).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(&mut tx);
        ledger.reserve(id, qty(2)).await.unwrap();
        let err = ledger.reserve(id, qty(2)).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { available: 1, requested: 2, .. }
        ));
        assert_eq!(ledger.available(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_release_floors_at_zero() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 3).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(&mut tx);
        ledger.reserve(id, qty(1)).await.unwrap();
        ledger.release(id, qty(5)).await.unwrap();
        ledger.release(ProductId::new(404), qty(1)).await.unwrap();
        assert_eq!(ledger.available(id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_check_rejects_inactive_product() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 3).await;

        let mut tx = store.begin().await.unwrap();
        let check = InventoryLedger::new(&mut tx).check(id, qty(3)).await.unwrap();
        assert!(check.sufficient);
        assert_eq!(check.total, 3);

        tx.update_product(id, Price::ZERO, false).await.unwrap();
        let err = InventoryLedger::new(&mut tx).check(id, qty(1)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_stock_keeps_reservations() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 10).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(&mut tx);
        ledger.reserve(id, qty(4)).await.unwrap();

        let err = ledger
            .stock(StockLevels { quantity: 3, ..StockLevels::default() }.for_product(id))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidStockLevels(_)));

        let inventory = ledger
            .stock(
                StockLevels {
                    quantity: 20,
                    min_stock_level: 5,
                    max_stock_level: 50,
                    cost_price: Some(Decimal::new(450, 2)),
                }
                .for_product(id),
            )
            .await
            .unwrap();
        assert_eq!(inventory.reserved_quantity, 4);
        assert_eq!(inventory.available(), 16);
    }

    #[tokio::test]
    async fn test_stock_validates_levels() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 0).await;
        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(&mut tx);

        for levels in [
            StockLevels { quantity: -1, ..StockLevels::default() },
            StockLevels { quantity: 1, min_stock_level: -1, ..StockLevels::default() },
            StockLevels { quantity: 1, min_stock_level: 5, max_stock_level: 2, cost_price: None },
            StockLevels { quantity: 1, cost_price: Some(Decimal::new(-1, 0)), ..StockLevels::default() },
            StockLevels { quantity: 1, cost_price: Some(Decimal::new(1, 3)), ..StockLevels::default() },
        ] {
            let err = ledger.stock(levels.for_product(id)).await.unwrap_err();
            assert!(matches!(err, CheckoutError::InvalidStockLevels(_)));
        }

        let err = ledger
            .stock(StockLevels::default().for_product(ProductId::new(404)))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_low_stock_and_status() {
        let store = MemoryStore::new();
        let low = testing::product(&store, "1.00", 3).await;
        let plenty = testing::product(&store, "1.00", 50).await;
        let empty = testing::product(&store, "1.00", 0).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(&mut tx);
        for id in [low, plenty, empty] {
            let quantity = ledger.available(id).await.unwrap();
            ledger
                .stock(
                    StockLevels {
                        quantity,
                        min_stock_level: 5,
                        max_stock_level: 100,
                        cost_price: None,
                    }
                    .for_product(id),
                )
                .await
                .unwrap();
        }

        assert_eq!(ledger.low_stock_count().await.unwrap(), 1);
        assert_eq!(ledger.stock_status(low).await.unwrap(), StockStatus::LowStock);
        assert_eq!(ledger.stock_status(plenty).await.unwrap(), StockStatus::InStock);
        assert_eq!(ledger.stock_status(empty).await.unwrap(), StockStatus::OutOfStock);
    }
}
