//! Cart models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cartwright_core::{CartId, CartItemId, ProductId, Quantity, UserId};

use super::Product;

/// A user's in-progress cart. At most one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Unique cart ID.
    pub id: CartId,
    /// Owner.
    pub user_id: UserId,
    /// When the cart was created.
    pub created_at: DateTime<Utc>,
    /// When the cart was last touched.
    pub updated_at: DateTime<Utc>,
}

/// One product line in a cart. Unique per `(cart_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Unique cart item ID.
    pub id: CartItemId,
    /// Cart this line belongs to.
    pub cart_id: CartId,
    /// Product in the line.
    pub product_id: ProductId,
    /// Units in the cart (always at least 1).
    pub quantity: Quantity,
    /// When the line was first added.
    pub created_at: DateTime<Utc>,
    /// When the quantity last changed.
    pub updated_at: DateTime<Utc>,
}

/// A cart line joined with the live product for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// The cart row.
    pub item: CartItem,
    /// Live product snapshot (current price and title).
    pub product: Product,
}

impl CartLine {
    /// Line total at the live price, `None` if out of range. Display only;
    /// checkout re-prices.
    #[must_use]
    pub fn display_total(&self) -> Option<Decimal> {
        self.product.price.line_total(self.item.quantity)
    }
}
