//! Storage seam for the checkout core.
//!
//! A [`Store`] opens transactions; a [`StoreTx`] is one open transaction and
//! exposes the row-level operations the components need. All state the
//! components share lives behind this seam, so every logical operation is a
//! single `begin .. commit` on one `StoreTx`.
//!
//! # Engines
//!
//! - [`postgres::PgStore`] - `PostgreSQL` via `sqlx`
//! - [`memory::MemoryStore`] - in-process engine with optimistic commit
//!   validation, for tests and embedded use
//!
//! Dropping a `StoreTx` without calling [`StoreTx::commit`] rolls it back.

pub mod memory;
pub mod postgres;

use std::future::Future;

use rust_decimal::Decimal;
use thiserror::Error;

use cartwright_core::{CartId, OrderId, OrderStatus, Price, ProductId, Quantity, UserId};

use crate::models::{
    Cart, CartItem, CartLine, Inventory, NewInventory, NewOrderItem, NewProduct, Order, OrderItem,
    Product,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors raised by a storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., duplicate cart for a user).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A concurrent transaction committed first (serialization failure,
    /// deadlock, or optimistic validation failure).
    #[error("transaction conflicted with a concurrent update")]
    SerializationConflict,

    /// An engine lock was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// The engine refused to commit.
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    /// Whether re-running the whole operation in a fresh transaction may
    /// succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SerializationConflict | Self::Conflict(_))
    }

    /// Whether the failure lies with the engine rather than the data, so a
    /// client repeating the request later may succeed.
    ///
    /// Covers conflicts, refused commits, pool exhaustion and dropped
    /// connections. Constraint violations, corrupt rows and poisoned locks
    /// will fail the same way again.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::SerializationConflict | Self::Conflict(_) | Self::Aborted(_) => true,
            Self::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            Self::DataCorruption(_) | Self::LockPoisoned => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            // 40001 serialization_failure, 40P01 deadlock_detected
            if matches!(db_err.code().as_deref(), Some("40001" | "40P01")) {
                return Self::SerializationConflict;
            }
            if db_err.is_unique_violation() {
                return Self::Conflict(db_err.message().to_owned());
            }
        }
        Self::Database(err)
    }
}

/// Opens transactions.
pub trait Store: Send + Sync + 'static {
    /// Transaction handle produced by this store.
    type Tx: StoreTx;

    /// Begin a new transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;
}

/// One open transaction.
///
/// Every write is invisible to other transactions until [`commit`](Self::commit)
/// succeeds. Conditional writes report whether they applied through their
/// return value rather than by error.
pub trait StoreTx: Send {
    // -- catalog --

    /// Look up a product by id, active or not.
    fn product(
        &mut self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, StoreError>> + Send;

    /// Insert a product.
    fn insert_product(
        &mut self,
        product: NewProduct,
    ) -> impl Future<Output = Result<Product, StoreError>> + Send;

    /// Change a product's price and active flag. Returns `false` if absent.
    fn update_product(
        &mut self,
        id: ProductId,
        price: Price,
        is_active: bool,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    // -- inventory --

    /// Read a product's stock counters.
    fn inventory(
        &mut self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Inventory>, StoreError>> + Send;

    /// Create or overwrite a product's stock counters, keeping
    /// `reserved_quantity`.
    fn put_inventory(
        &mut self,
        inventory: NewInventory,
    ) -> impl Future<Output = Result<Inventory, StoreError>> + Send;

    /// Add `amount` to `reserved_quantity` iff `quantity - reserved_quantity >= amount`.
    ///
    /// Returns `true` if the reservation was applied.
    fn try_reserve(
        &mut self,
        id: ProductId,
        amount: Quantity,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Subtract `amount` from `reserved_quantity`, floored at zero.
    ///
    /// Returns `false` if the product has no inventory row.
    fn release(
        &mut self,
        id: ProductId,
        amount: Quantity,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Count active products with `0 < available <= min_stock_level`.
    fn low_stock_count(&mut self) -> impl Future<Output = Result<i64, StoreError>> + Send;

    // -- carts --

    /// Find the user's cart without creating it.
    fn find_cart(
        &mut self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<Cart>, StoreError>> + Send;

    /// Return the user's cart, creating it if needed.
    fn get_or_create_cart(
        &mut self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Cart, StoreError>> + Send;

    /// Read one cart line.
    fn cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Option<CartItem>, StoreError>> + Send;

    /// Insert a cart line, or add `delta` to the existing line.
    fn add_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        delta: Quantity,
    ) -> impl Future<Output = Result<CartItem, StoreError>> + Send;

    /// Take one unit off a cart line, deleting the line when its last unit
    /// goes. Returns the remaining quantity, 0 if the line is gone or was
    /// never there.
    ///
    /// The change is relative to the stored row, so concurrent decrements
    /// of the same line each count.
    fn decrement_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> impl Future<Output = Result<i32, StoreError>> + Send;

    /// Delete a cart line. Returns `false` if absent.
    fn delete_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Cart lines joined with their active products, most recently added first.
    fn cart_lines(
        &mut self,
        cart_id: CartId,
    ) -> impl Future<Output = Result<Vec<CartLine>, StoreError>> + Send;

    /// Delete every line of a cart. Returns the number of rows deleted.
    fn clear_cart(
        &mut self,
        cart_id: CartId,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    // -- orders --

    /// Insert an order header.
    fn insert_order(
        &mut self,
        user_id: UserId,
        total_amount: Decimal,
        status: OrderStatus,
    ) -> impl Future<Output = Result<Order, StoreError>> + Send;

    /// Insert an order line snapshot.
    fn insert_order_item(
        &mut self,
        item: NewOrderItem,
    ) -> impl Future<Output = Result<OrderItem, StoreError>> + Send;

    /// Move an order from `from` to `to` iff it is currently in `from`.
    ///
    /// Returns `true` if the status changed.
    fn update_order_status(
        &mut self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Read an order header.
    fn order(
        &mut self,
        id: OrderId,
    ) -> impl Future<Output = Result<Option<Order>, StoreError>> + Send;

    /// A user's orders, most recent first.
    fn user_orders(
        &mut self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Order>, StoreError>> + Send;

    /// Read an order's lines in insertion order.
    fn order_items(
        &mut self,
        id: OrderId,
    ) -> impl Future<Output = Result<Vec<OrderItem>, StoreError>> + Send;

    // -- transaction control --

    /// Make every write of this transaction visible atomically.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard every write of this transaction.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
