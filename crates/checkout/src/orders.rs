//! Order assembler: cart-to-order conversion and order lifecycle.
//!
//! # Checkout sequence
//!
//! All steps run in the caller's transaction; any failure drops the
//! transaction and nothing becomes visible.
//!
//! 1. Advisory stock check per line (fast fail, no writes)
//! 2. Insert the order as `pending` with the client's total
//! 3. Insert one price snapshot per line, summing the server total
//! 4. Abort on any difference between server and client totals
//! 5. Empty the user's cart
//! 6. Move the order `pending -> processing`
//! 7. Reserve each line with the conditional update (the authoritative check)

use rust_decimal::Decimal;

use cartwright_core::{OrderId, OrderStatus, Price, UserId};

use crate::error::{CheckoutError, Result};
use crate::inventory::InventoryLedger;
use crate::models::{CheckoutLine, NewOrderItem, Order, OrderDetails, OrderReceipt};
use crate::pricing::QuotedLine;
use crate::store::{StoreError, StoreTx};

/// Reject a checkout request that cannot succeed, before any storage access.
///
/// # Errors
///
/// Returns `CheckoutError::EmptyCart` for no lines,
/// `CheckoutError::InvalidTotal` for a total that is not positive and
/// `CheckoutError::AmountOutOfRange` for one no order can hold.
pub fn validate_checkout(lines: &[CheckoutLine], total_amount: Decimal) -> Result<()> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if total_amount <= Decimal::ZERO {
        return Err(CheckoutError::InvalidTotal(total_amount));
    }
    if total_amount > Price::MAX_AMOUNT {
        return Err(CheckoutError::AmountOutOfRange);
    }
    Ok(())
}

/// Order operations scoped to one open transaction.
pub struct OrderAssembler<'t, T> {
    tx: &'t mut T,
}

impl<'t, T: StoreTx> OrderAssembler<'t, T> {
    /// Create an assembler view over `tx`.
    #[must_use]
    pub const fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }

    /// Turn priced lines into a `processing` order with reserved stock.
    ///
    /// The caller commits the transaction on success and drops it on error.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InsufficientStock` naming the first line that
    /// does not fit, `CheckoutError::PriceMismatch` if the quoted prices do
    /// not add up to `client_total`, or `CheckoutError::AmountOutOfRange` if a
    /// line or the order total is too large to store.
    pub async fn assemble(
        &mut self,
        user_id: UserId,
        lines: &[QuotedLine],
        client_total: Decimal,
    ) -> Result<OrderReceipt> {
        for line in lines {
            let available = InventoryLedger::new(&mut *self.tx)
                .available(line.product_id)
                .await?;
            if available < line.quantity.get() {
                tracing::warn!(
                    product_id = %line.product_id,
                    available,
                    requested = line.quantity.get(),
                    "checkout rejected: insufficient stock"
                );
                return Err(CheckoutError::InsufficientStock {
                    product_id: line.product_id,
                    available,
                    requested: line.quantity.get(),
                });
            }
        }

        let order = self
            .tx
            .insert_order(user_id, client_total, OrderStatus::Pending)
            .await?;

        let mut calculated = Decimal::ZERO;
        for line in lines {
            let total_price = line
                .unit_price
                .line_total(line.quantity)
                .ok_or(CheckoutError::AmountOutOfRange)?;
            calculated = calculated
                .checked_add(total_price)
                .filter(|sum| *sum <= Price::MAX_AMOUNT)
                .ok_or(CheckoutError::AmountOutOfRange)?;
            self.tx
                .insert_order_item(NewOrderItem {
                    order_id: order.id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    total_price,
                })
                .await?;
        }

        if calculated != client_total {
            tracing::warn!(
                %calculated,
                requested = %client_total,
                "checkout rejected: price mismatch"
            );
            return Err(CheckoutError::PriceMismatch {
                calculated,
                requested: client_total,
            });
        }

        if let Some(cart) = self.tx.find_cart(user_id).await? {
            let cleared = self.tx.clear_cart(cart.id).await?;
            tracing::debug!(cart_id = %cart.id, cleared, "cart emptied");
        }

        self.transition(&order, OrderStatus::Processing).await?;

        let mut ledger = InventoryLedger::new(&mut *self.tx);
        for line in lines {
            ledger.reserve(line.product_id, line.quantity).await?;
        }

        Ok(OrderReceipt {
            order_id: order.id,
            total_amount: calculated,
            status: OrderStatus::Processing,
        })
    }

    /// Cancel one of the user's orders, releasing its reservations.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if the order does not exist or
    /// belongs to someone else, and `CheckoutError::InvalidTransition` if it
    /// is already cancelled or completed.
    pub async fn cancel(&mut self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self.owned_order(user_id, order_id).await?;
        self.transition(&order, OrderStatus::Cancelled).await?;

        if order.status.holds_reservation() {
            let items = self.tx.order_items(order_id).await?;
            let mut ledger = InventoryLedger::new(&mut *self.tx);
            for item in &items {
                ledger.release(item.product_id, item.quantity).await?;
            }
        }

        self.tx
            .order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// Read one of the user's orders with its lines.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if the order does not exist or
    /// belongs to someone else.
    pub async fn find(&mut self, user_id: UserId, order_id: OrderId) -> Result<OrderDetails> {
        let order = self.owned_order(user_id, order_id).await?;
        let items = self.tx.order_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    /// The user's orders, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transaction` if the store fails.
    pub async fn list(&mut self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.tx.user_orders(user_id).await?)
    }

    async fn owned_order(&mut self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        match self.tx.order(order_id).await? {
            Some(order) if order.user_id == user_id => Ok(order),
            _ => Err(CheckoutError::OrderNotFound(order_id)),
        }
    }

    async fn transition(&mut self, order: &Order, to: OrderStatus) -> Result<()> {
        if !order.status.can_transition_to(to) {
            return Err(CheckoutError::InvalidTransition {
                from: order.status,
                to,
            });
        }
        if !self.tx.update_order_status(order.id, order.status, to).await? {
            // Status moved under us; the retry will see the new one.
            return Err(StoreError::SerializationConflict.into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartwright_core::{ProductId, Quantity};

    use super::*;
    use crate::cart::CartStore;
    use crate::store::{MemoryStore, Store};
    use crate::testing;

    fn quoted(product_id: ProductId, quantity: i32, price: &str) -> QuotedLine {
        QuotedLine {
            product_id,
            quantity: Quantity::new(quantity).unwrap(),
            unit_price: price.parse::<Price>().unwrap(),
        }
    }

    #[test]
    fn test_validate_checkout() {
        let line = CheckoutLine::new(ProductId::new(1), Quantity::ONE);
        assert!(matches!(
            validate_checkout(&[], Decimal::ONE),
            Err(CheckoutError::EmptyCart)
        ));
        assert!(matches!(
            validate_checkout(&[line], Decimal::ZERO),
            Err(CheckoutError::InvalidTotal(_))
        ));
        assert!(matches!(
            validate_checkout(&[line], Decimal::new(-5, 0)),
            Err(CheckoutError::InvalidTotal(_))
        ));
        assert!(validate_checkout(&[line], Decimal::new(1, 2)).is_ok());
        assert!(validate_checkout(&[line], Price::MAX_AMOUNT).is_ok());
        assert!(matches!(
            validate_checkout(&[line], Decimal::MAX),
            Err(CheckoutError::AmountOutOfRange)
        ));
    }

    #[tokio::test]
    async fn test_oversized_line_total_is_rejected() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "9999999999.99", 5).await;

        let mut tx = store.begin().await.unwrap();
        let err = OrderAssembler::new(&mut tx)
            .assemble(
                testing::user(),
                &[quoted(id, 2, "9999999999.99")],
                Decimal::new(1, 0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::AmountOutOfRange));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_oversized_order_total_is_rejected() {
        let store = MemoryStore::new();
        let a = testing::product(&store, "6000000000.00", 5).await;
        let b = testing::product(&store, "6000000000.00", 5).await;

        let mut tx = store.begin().await.unwrap();
        let err = OrderAssembler::new(&mut tx)
            .assemble(
                testing::user(),
                &[quoted(a, 1, "6000000000.00"), quoted(b, 1, "6000000000.00")],
                Decimal::new(1, 0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::AmountOutOfRange));
    }

    #[tokio::test]
    async fn test_assemble_creates_processing_order() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;
        let user = testing::user();

        let mut tx = store.begin().await.unwrap();
        CartStore::new(&mut tx)
            .add_or_increment(user, id, Quantity::new(2).unwrap())
            .await
            .unwrap();
        let receipt = OrderAssembler::new(&mut tx)
            .assemble(user, &[quoted(id, 2, "10.00")], Decimal::new(2000, 2))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(receipt.status, OrderStatus::Processing);
        assert_eq!(receipt.total_amount, Decimal::new(2000, 2));
        assert_eq!(testing::reserved(&store, id).await, 2);

        let mut tx = store.begin().await.unwrap();
        assert!(CartStore::new(&mut tx).list(user).await.unwrap().is_empty());
        let details = OrderAssembler::new(&mut tx)
            .find(user, receipt.order_id)
            .await
            .unwrap();
        assert_eq!(details.order.status, OrderStatus::Processing);
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].total_price, Decimal::new(2000, 2));
    }

    #[tokio::test]
    async fn test_assemble_rejects_price_mismatch() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "10.00", 5).await;

        let mut tx = store.begin().await.unwrap();
        let err = OrderAssembler::new(&mut tx)
            .assemble(testing::user(), &[quoted(id, 2, "10.00")], Decimal::new(1900, 2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::PriceMismatch { calculated, requested }
                if calculated == Decimal::new(2000, 2) && requested == Decimal::new(1900, 2)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_lines_cannot_oversell() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "1.00", 3).await;

        let mut tx = store.begin().await.unwrap();
        let err = OrderAssembler::new(&mut tx)
            .assemble(
                testing::user(),
                &[quoted(id, 2, "1.00"), quoted(id, 2, "1.00")],
                Decimal::new(4, 0),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { available: 1, requested: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_orders_are_private_to_their_owner() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "5.00", 5).await;
        let owner = testing::user();

        let mut tx = store.begin().await.unwrap();
        let receipt = OrderAssembler::new(&mut tx)
            .assemble(owner, &[quoted(id, 1, "5.00")], Decimal::new(5, 0))
            .await
            .unwrap();

        let mut orders = OrderAssembler::new(&mut tx);
        assert_eq!(orders.list(owner).await.unwrap().len(), 1);
        assert!(orders.list(testing::user()).await.unwrap().is_empty());
        assert!(matches!(
            orders.find(testing::user(), receipt.order_id).await,
            Err(CheckoutError::OrderNotFound(_))
        ));
        assert!(matches!(
            orders.cancel(testing::user(), receipt.order_id).await,
            Err(CheckoutError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_releases_and_is_final() {
        let store = MemoryStore::new();
        let id = testing::product(&store, "5.00", 5).await;
        let user = testing::user();

        let mut tx = store.begin().await.unwrap();
        let receipt = OrderAssembler::new(&mut tx)
            .assemble(user, &[quoted(id, 3, "5.00")], Decimal::new(15, 0))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(testing::reserved(&store, id).await, 3);

        let mut tx = store.begin().await.unwrap();
        let order = OrderAssembler::new(&mut tx)
            .cancel(user, receipt.order_id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(testing::reserved(&store, id).await, 0);

        let mut tx = store.begin().await.unwrap();
        let err = OrderAssembler::new(&mut tx)
            .cancel(user, receipt.order_id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Cancelled
            }
        ));
    }
}
