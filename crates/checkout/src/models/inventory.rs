//! Inventory ledger rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cartwright_core::{ProductId, Quantity, StockStatus};

/// Stock counters for one product at the single stocking location.
///
/// Invariant: `0 <= reserved_quantity <= quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Product this row counts.
    pub product_id: ProductId,
    /// Physical units on hand.
    pub quantity: i32,
    /// Units held by confirmed orders.
    pub reserved_quantity: i32,
    /// Low-water mark for restocking.
    pub min_stock_level: i32,
    /// Target stock level.
    pub max_stock_level: i32,
    /// Unit cost, if known.
    pub cost_price: Option<Decimal>,
    /// When the counters last changed.
    pub updated_at: DateTime<Utc>,
}

impl Inventory {
    /// Units that can still be reserved.
    #[must_use]
    pub const fn available(&self) -> i32 {
        self.quantity - self.reserved_quantity
    }

    /// Whether `amount` more units can be reserved without overselling.
    #[must_use]
    pub const fn can_reserve(&self, amount: Quantity) -> bool {
        self.available() >= amount.get()
    }

    /// Stock classification for display.
    #[must_use]
    pub const fn stock_status(&self) -> StockStatus {
        StockStatus::classify(Some((self.available(), self.min_stock_level)))
    }
}

/// Parameters for creating or overwriting a product's stock counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventory {
    /// Product to stock.
    pub product_id: ProductId,
    /// Physical units on hand.
    pub quantity: i32,
    /// Low-water mark.
    pub min_stock_level: i32,
    /// Target stock level.
    pub max_stock_level: i32,
    /// Unit cost, if known.
    pub cost_price: Option<Decimal>,
}

/// Stock counters supplied by an operator, before they are tied to a product.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockLevels {
    /// Physical units on hand.
    pub quantity: i32,
    /// Low-water mark.
    #[serde(default)]
    pub min_stock_level: i32,
    /// Target stock level.
    #[serde(default)]
    pub max_stock_level: i32,
    /// Unit cost, if known.
    #[serde(default)]
    pub cost_price: Option<Decimal>,
}

impl StockLevels {
    /// Bind the levels to a product.
    #[must_use]
    pub fn for_product(self, product_id: ProductId) -> NewInventory {
        NewInventory {
            product_id,
            quantity: self.quantity,
            min_stock_level: self.min_stock_level,
            max_stock_level: self.max_stock_level,
            cost_price: self.cost_price,
        }
    }
}

/// Result of a stock availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheck {
    /// Product checked.
    pub product_id: ProductId,
    /// `quantity - reserved_quantity`, or 0 without an inventory row.
    pub available: i32,
    /// Physical units on hand.
    pub total: i32,
    /// Units currently reserved.
    pub reserved: i32,
    /// Units asked for.
    pub requested: i32,
    /// Whether `available >= requested`.
    pub sufficient: bool,
    /// Display classification.
    pub status: StockStatus,
}

impl StockCheck {
    /// Build a check result from an optional inventory row.
    #[must_use]
    pub fn from_inventory(
        product_id: ProductId,
        inventory: Option<&Inventory>,
        requested: Quantity,
    ) -> Self {
        match inventory {
            Some(row) => Self {
                product_id,
                available: row.available(),
                total: row.quantity,
                reserved: row.reserved_quantity,
                requested: requested.get(),
                sufficient: row.can_reserve(requested),
                status: row.stock_status(),
            },
            None => Self {
                product_id,
                available: 0,
                total: 0,
                reserved: 0,
                requested: requested.get(),
                sufficient: false,
                status: StockStatus::OutOfStock,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(quantity: i32, reserved_quantity: i32, min_stock_level: i32) -> Inventory {
        Inventory {
            product_id: ProductId::new(1),
            quantity,
            reserved_quantity,
            min_stock_level,
            max_stock_level: 100,
            cost_price: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_available_subtracts_reservations() {
        let inv = row(10, 4, 0);
        assert_eq!(inv.available(), 6);
        assert!(inv.can_reserve(Quantity::new(6).unwrap()));
        assert!(!inv.can_reserve(Quantity::new(7).unwrap()));
    }

    #[test]
    fn test_check_without_row_is_empty() {
        let check = StockCheck::from_inventory(ProductId::new(3), None, Quantity::ONE);
        assert_eq!(check.available, 0);
        assert_eq!(check.total, 0);
        assert!(!check.sufficient);
        assert_eq!(check.status, StockStatus::OutOfStock);
    }

    #[test]
    fn test_check_reports_low_stock() {
        let inv = row(10, 7, 5);
        let check = StockCheck::from_inventory(inv.product_id, Some(&inv), Quantity::new(2).unwrap());
        assert_eq!(check.available, 3);
        assert_eq!(check.reserved, 7);
        assert!(check.sufficient);
        assert_eq!(check.status, StockStatus::LowStock);
    }
}
