//! Order models and checkout request/response shapes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cartwright_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, Quantity, UserId};

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Sum of the items' `total_price`.
    pub total_amount: Decimal,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

/// Price snapshot of one order line, frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Unique order item ID.
    pub id: OrderItemId,
    /// Order this line belongs to.
    pub order_id: OrderId,
    /// Product bought.
    pub product_id: ProductId,
    /// Units bought.
    pub quantity: Quantity,
    /// Unit price charged.
    pub unit_price: Price,
    /// `unit_price * quantity`.
    pub total_price: Decimal,
}

/// Parameters for inserting an order item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    /// Order this line belongs to.
    pub order_id: OrderId,
    /// Product bought.
    pub product_id: ProductId,
    /// Units bought.
    pub quantity: Quantity,
    /// Unit price charged.
    pub unit_price: Price,
    /// `unit_price * quantity`, already range-checked.
    pub total_price: Decimal,
}

/// A line of the cart as submitted by the client at checkout.
///
/// Carries no price: prices are always re-read on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    /// Product to buy.
    pub product_id: ProductId,
    /// Units to buy.
    pub quantity: Quantity,
}

impl CheckoutLine {
    /// Create a checkout line.
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    /// Created order.
    pub order_id: OrderId,
    /// Server-computed total.
    pub total_amount: Decimal,
    /// Status after commit (`processing`).
    pub status: OrderStatus,
}

/// An order with its line snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    /// The order row.
    pub order: Order,
    /// Its lines, in insertion order.
    pub items: Vec<OrderItem>,
}
