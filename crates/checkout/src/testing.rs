//! Fixtures shared by the unit tests.

#![allow(clippy::unwrap_used)]

use cartwright_core::{ProductId, UserId};

use crate::models::{NewProduct, StockLevels};
use crate::store::{MemoryStore, Store, StoreTx};

/// Insert an active product at `price` with `quantity` units on hand.
pub async fn product(store: &MemoryStore, price: &str, quantity: i32) -> ProductId {
    let mut tx = store.begin().await.unwrap();
    let product = tx
        .insert_product(NewProduct {
            title: format!("Product at {price}"),
            price: price.parse().unwrap(),
            is_active: true,
        })
        .await
        .unwrap();
    tx.put_inventory(
        StockLevels {
            quantity,
            max_stock_level: quantity.max(100),
            ..StockLevels::default()
        }
        .for_product(product.id),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    product.id
}

/// Committed `reserved_quantity` of a product.
pub async fn reserved(store: &MemoryStore, id: ProductId) -> i32 {
    let mut tx = store.begin().await.unwrap();
    tx.inventory(id).await.unwrap().unwrap().reserved_quantity
}

/// A fresh shopper.
pub fn user() -> UserId {
    UserId::random()
}
