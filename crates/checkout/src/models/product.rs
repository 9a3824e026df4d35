//! Catalog product as seen by checkout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cartwright_core::{Price, ProductId};

/// A catalog product.
///
/// Read-only from the checkout's point of view; `price` here is the live
/// price, which is never copied onto an order except through a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// Current unit price.
    pub price: Price,
    /// Inactive products cannot be added to carts or bought.
    pub is_active: bool,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Parameters for inserting a product (seeding and tooling).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    /// Display title.
    pub title: String,
    /// Unit price.
    pub price: Price,
    /// Whether the product is purchasable.
    pub is_active: bool,
}
