//! `PostgreSQL` storage engine.
//!
//! # Tables
//!
//! - `products` - Catalog rows read by checkout (price, active flag, title)
//! - `inventory` - Stock counters, one row per product
//! - `carts` / `cart_items` - One cart per user, one line per product
//! - `orders` / `order_items` - Orders and their price snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/checkout/migrations/` and run via:
//! ```bash
//! cargo run -p cartwright-cli -- migrate
//! ```
//!
//! Reservations rely on a single conditional `UPDATE` whose affected-row
//! count is the answer. Under `READ COMMITTED` the second of two concurrent
//! updates re-evaluates its `WHERE` clause against the committed row, so the
//! stock can never be over-reserved.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use cartwright_core::{
    CartId, CartItemId, OrderId, OrderItemId, OrderStatus, Price, ProductId, Quantity, UserId,
};

use super::{Store, StoreError, StoreTx};
use crate::config::PoolConfig;
use crate::models::{
    Cart, CartItem, CartLine, Inventory, NewInventory, NewOrderItem, NewProduct, Order, OrderItem,
    Product,
};

/// Embedded checkout migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Create a `PostgreSQL` connection pool.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    config: &PoolConfig,
    database_url: &SecretString,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(Some(config.max_lifetime))
        .connect(database_url.expose_secret())
        .await
}

/// [`Store`] backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using pool settings and a database URL.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection cannot be established.
    pub async fn connect(
        config: &PoolConfig,
        database_url: &SecretString,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(create_pool(config, database_url).await?))
    }

    /// Get the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::migrate::MigrateError` if a migration fails.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await
    }
}

impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }
}

/// Transaction on a [`PgStore`]. Rolled back on drop unless committed.
#[derive(Debug)]
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

// =============================================================================
// Row types
// =============================================================================

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::DataCorruption(format!("invalid {what} in database: {err}"))
}

#[derive(FromRow)]
struct ProductRow {
    id: i32,
    title: String,
    price: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            title: row.title,
            price: Price::new(row.price).map_err(|e| corrupt("price", e))?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InventoryRow {
    product_id: i32,
    quantity: i32,
    reserved_quantity: i32,
    min_stock_level: i32,
    max_stock_level: i32,
    cost_price: Option<Decimal>,
    updated_at: DateTime<Utc>,
}

impl From<InventoryRow> for Inventory {
    fn from(row: InventoryRow) -> Self {
        Self {
            product_id: ProductId::new(row.product_id),
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
            min_stock_level: row.min_stock_level,
            max_stock_level: row.max_stock_level,
            cost_price: row.cost_price,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CartRow {
    id: i32,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            id: CartId::new(row.id),
            user_id: UserId::new(row.user_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CartItemRow {
    id: i32,
    cart_id: i32,
    product_id: i32,
    quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = StoreError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CartItemId::new(row.id),
            cart_id: CartId::new(row.cart_id),
            product_id: ProductId::new(row.product_id),
            quantity: Quantity::new(row.quantity).map_err(|e| corrupt("cart quantity", e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CartLineRow {
    #[sqlx(flatten)]
    item: CartItemRow,
    title: String,
    price: Decimal,
    is_active: bool,
    product_created_at: DateTime<Utc>,
    product_updated_at: DateTime<Utc>,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = StoreError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let product = Product::try_from(ProductRow {
            id: row.item.product_id,
            title: row.title,
            price: row.price,
            is_active: row.is_active,
            created_at: row.product_created_at,
            updated_at: row.product_updated_at,
        })?;
        Ok(Self {
            item: CartItem::try_from(row.item)?,
            product,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: i32,
    user_id: Uuid,
    total_amount: Decimal,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            total_amount: row.total_amount,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            quantity: Quantity::new(row.quantity).map_err(|e| corrupt("order quantity", e))?,
            unit_price: Price::new(row.unit_price).map_err(|e| corrupt("unit price", e))?,
            total_price: row.total_price,
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, title, price, is_active, created_at, updated_at";
const INVENTORY_COLUMNS: &str = "product_id, quantity, reserved_quantity, min_stock_level, \
                                 max_stock_level, cost_price, updated_at";
const CART_COLUMNS: &str = "id, user_id, created_at, updated_at";
const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, total_amount, status, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price, total_price";

/// Update/delete attempts before a decrement gives up on a churning line.
const DECREMENT_ROUNDS: usize = 3;

// =============================================================================
// Transaction operations
// =============================================================================

impl StoreTx for PgTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Product::try_from).transpose()
    }

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (title, price, is_active) VALUES ($1, $2, $3) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&product.title)
        .bind(product.price.amount())
        .bind(product.is_active)
        .fetch_one(&mut *self.tx)
        .await?;
        Product::try_from(row)
    }

    async fn update_product(
        &mut self,
        id: ProductId,
        price: Price,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE products SET price = $2, is_active = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(price.amount())
        .bind(is_active)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn inventory(&mut self, id: ProductId) -> Result<Option<Inventory>, StoreError> {
        let row = sqlx::query_as::<_, InventoryRow>(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Inventory::from))
    }

    async fn put_inventory(&mut self, inventory: NewInventory) -> Result<Inventory, StoreError> {
        let row = sqlx::query_as::<_, InventoryRow>(&format!(
            r"
            INSERT INTO inventory (product_id, quantity, min_stock_level, max_stock_level, cost_price)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                min_stock_level = EXCLUDED.min_stock_level,
                max_stock_level = EXCLUDED.max_stock_level,
                cost_price = EXCLUDED.cost_price,
                updated_at = NOW()
            RETURNING {INVENTORY_COLUMNS}
            "
        ))
        .bind(inventory.product_id)
        .bind(inventory.quantity)
        .bind(inventory.min_stock_level)
        .bind(inventory.max_stock_level)
        .bind(inventory.cost_price)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn try_reserve(&mut self, id: ProductId, amount: Quantity) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE inventory
            SET reserved_quantity = reserved_quantity + $2, updated_at = NOW()
            WHERE product_id = $1 AND quantity - reserved_quantity >= $2
            ",
        )
        .bind(id)
        .bind(amount.get())
        .execute(&mut *self.tx)
        .await?;
        tracing::debug!(
            product_id = %id,
            amount = amount.get(),
            applied = result.rows_affected(),
            "reserve"
        );
        Ok(result.rows_affected() == 1)
    }

    async fn release(&mut self, id: ProductId, amount: Quantity) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE inventory
            SET reserved_quantity = GREATEST(reserved_quantity - $2, 0), updated_at = NOW()
            WHERE product_id = $1
            ",
        )
        .bind(id)
        .bind(amount.get())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn low_stock_count(&mut self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(*)
            FROM inventory i
            JOIN products p ON p.id = i.product_id
            WHERE p.is_active
              AND i.min_stock_level > 0
              AND i.quantity - i.reserved_quantity > 0
              AND i.quantity - i.reserved_quantity <= i.min_stock_level
            ",
        )
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<Cart>, StoreError> {
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Cart::from))
    }

    async fn get_or_create_cart(&mut self, user_id: UserId) -> Result<Cart, StoreError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, CartRow>(&format!(
            r"
            INSERT INTO carts (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = carts.updated_at
            RETURNING {CART_COLUMNS}
            "
        ))
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>, StoreError> {
        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 AND product_id = $2"
        ))
        .bind(cart_id)
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CartItem::try_from).transpose()
    }

    async fn add_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        delta: Quantity,
    ) -> Result<CartItem, StoreError> {
        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            r"
            INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE
            SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW()
            RETURNING {CART_ITEM_COLUMNS}
            "
        ))
        .bind(cart_id)
        .bind(product_id)
        .bind(delta.get())
        .fetch_one(&mut *self.tx)
        .await?;
        CartItem::try_from(row)
    }

    async fn decrement_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<i32, StoreError> {
        // A concurrent add can slip in between the two statements; go round
        // again so that unit is decremented instead of deleted.
        for _ in 0..DECREMENT_ROUNDS {
            let remaining: Option<i32> = sqlx::query_scalar(
                r"
                UPDATE cart_items SET quantity = quantity - 1, updated_at = NOW()
                WHERE cart_id = $1 AND product_id = $2 AND quantity > 1
                RETURNING quantity
                ",
            )
            .bind(cart_id)
            .bind(product_id)
            .fetch_optional(&mut *self.tx)
            .await?;
            if let Some(remaining) = remaining {
                return Ok(remaining);
            }

            let deleted = sqlx::query(
                "DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2 AND quantity <= 1",
            )
            .bind(cart_id)
            .bind(product_id)
            .execute(&mut *self.tx)
            .await?;
            if deleted.rows_affected() == 1 {
                return Ok(0);
            }

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM cart_items WHERE cart_id = $1 AND product_id = $2)",
            )
            .bind(cart_id)
            .bind(product_id)
            .fetch_one(&mut *self.tx)
            .await?;
            if !exists {
                return Ok(0);
            }
        }
        Err(StoreError::Conflict(format!(
            "cart line for product {product_id} kept changing during decrement"
        )))
    }

    async fn delete_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>, StoreError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.created_at, ci.updated_at,
                   p.title, p.price, p.is_active,
                   p.created_at AS product_created_at,
                   p.updated_at AS product_updated_at
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1 AND p.is_active
            ORDER BY ci.created_at DESC, ci.id DESC
            ",
        )
        .bind(cart_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(CartLine::try_from).collect()
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_order(
        &mut self,
        user_id: UserId,
        total_amount: Decimal,
        status: OrderStatus,
    ) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (user_id, total_amount, status) VALUES ($1, $2, $3) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(total_amount)
        .bind(status)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem, StoreError> {
        let row = sqlx::query_as::<_, OrderItemRow>(&format!(
            r"
            INSERT INTO order_items (order_id, product_id, quantity, unit_price, total_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_ITEM_COLUMNS}
            "
        ))
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.quantity.get())
        .bind(item.unit_price.amount())
        .bind(item.total_price)
        .fetch_one(&mut *self.tx)
        .await?;
        OrderItem::try_from(row)
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Order::from))
    }

    async fn user_orders(&mut self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(OrderItem::try_from).collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
