//! In-process storage engine.
//!
//! Each transaction works on a snapshot of the committed tables. Snapshots
//! share tables copy-on-write: `begin` is a handful of reference-count bumps,
//! a transaction clones a table the first time it writes to it, and `commit`
//! clones a committed table only while an open snapshot still holds it. Cost
//! therefore scales with the tables written, not with the whole catalog.
//!
//! Every row a transaction writes is recorded together with the row version
//! it was based on;
//! `commit` takes the engine lock, checks that none of those rows was changed
//! by a transaction that committed in the meantime, then publishes the
//! written rows and bumps their versions. A failed check surfaces as
//! [`StoreError::SerializationConflict`], which the facade retries.
//!
//! Transactions writing disjoint rows never conflict. Id sequences are not
//! transactional: a rolled-back insert leaves a gap.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rust_decimal::Decimal;

use cartwright_core::{
    CartId, CartItemId, OrderId, OrderItemId, OrderStatus, Price, ProductId, Quantity, UserId,
};

use super::{Store, StoreError, StoreTx};
use crate::models::{
    Cart, CartItem, CartLine, Inventory, NewInventory, NewOrderItem, NewProduct, Order, OrderItem,
    Product,
};

/// Identity of one row, used for optimistic validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Product(ProductId),
    Inventory(ProductId),
    Cart(UserId),
    CartItem(CartId, ProductId),
    Order(OrderId),
    OrderItem(OrderItemId),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    products: Arc<BTreeMap<ProductId, Product>>,
    inventory: Arc<BTreeMap<ProductId, Inventory>>,
    carts: Arc<BTreeMap<UserId, Cart>>,
    cart_items: Arc<BTreeMap<(CartId, ProductId), CartItem>>,
    orders: Arc<BTreeMap<OrderId, Order>>,
    order_items: Arc<BTreeMap<OrderItemId, OrderItem>>,
}

impl Tables {
    /// Make the row identified by `key` in `self` match `from`.
    fn copy_row(&mut self, from: &Self, key: RowKey) {
        match key {
            RowKey::Product(id) => copy_entry(&mut self.products, &*from.products, id),
            RowKey::Inventory(id) => copy_entry(&mut self.inventory, &*from.inventory, id),
            RowKey::Cart(user) => copy_entry(&mut self.carts, &*from.carts, user),
            RowKey::CartItem(cart, product) => {
                copy_entry(&mut self.cart_items, &*from.cart_items, (cart, product));
            }
            RowKey::Order(id) => copy_entry(&mut self.orders, &*from.orders, id),
            RowKey::OrderItem(id) => copy_entry(&mut self.order_items, &*from.order_items, id),
        }
    }
}

/// Copy one row across. Clones the target table only if a live snapshot
/// still shares it.
fn copy_entry<K: Ord + Copy, V: Clone>(
    to: &mut Arc<BTreeMap<K, V>>,
    from: &BTreeMap<K, V>,
    key: K,
) {
    match from.get(&key) {
        Some(row) => {
            Arc::make_mut(to).insert(key, row.clone());
        }
        None => {
            if to.contains_key(&key) {
                Arc::make_mut(to).remove(&key);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Committed {
    tables: Tables,
    versions: Arc<HashMap<RowKey, u64>>,
}

#[derive(Debug, Default)]
struct Sequences {
    product: AtomicI32,
    cart: AtomicI32,
    cart_item: AtomicI32,
    order: AtomicI32,
    order_item: AtomicI32,
}

fn next_id(counter: &AtomicI32) -> i32 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Default)]
struct Shared {
    committed: Mutex<Committed>,
    sequences: Sequences,
    fail_next_commit: AtomicBool,
    injected_conflicts: AtomicU32,
}

/// In-memory [`Store`].
///
/// Cheap to clone; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` on any transaction fail with
    /// [`StoreError::Aborted`]. One-shot.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next `count` commits fail with
    /// [`StoreError::SerializationConflict`], as if a concurrent transaction
    /// had won each time.
    pub fn conflict_next_commits(&self, count: u32) {
        self.shared.injected_conflicts.store(count, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Result<MemoryTx, StoreError> {
        let committed = self
            .shared
            .committed
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            tables: committed.tables.clone(),
            versions: Arc::clone(&committed.versions),
            writes: HashMap::new(),
        })
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        self.snapshot()
    }
}

/// Transaction on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    shared: Arc<Shared>,
    tables: Tables,
    /// Row versions as of the snapshot.
    versions: Arc<HashMap<RowKey, u64>>,
    /// Rows written, with the version each write was based on.
    writes: HashMap<RowKey, u64>,
}

impl MemoryTx {
    fn touch(&mut self, key: RowKey) {
        let base = self.versions.get(&key).copied().unwrap_or(0);
        self.writes.entry(key).or_insert(base);
    }

    fn publish(self) -> Result<(), StoreError> {
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Aborted("injected commit failure".to_owned()));
        }
        if self
            .shared
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::SerializationConflict);
        }

        let mut committed = self
            .shared
            .committed
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?;

        for (key, base) in &self.writes {
            let current = committed.versions.get(key).copied().unwrap_or(0);
            if current != *base {
                tracing::debug!(?key, base, current, "optimistic validation failed");
                return Err(StoreError::SerializationConflict);
            }
        }

        for key in self.writes.keys() {
            committed.tables.copy_row(&self.tables, *key);
            *Arc::make_mut(&mut committed.versions).entry(*key).or_insert(0) += 1;
        }
        tracing::debug!(rows = self.writes.len(), "memory transaction committed");
        Ok(())
    }
}

fn quantity(value: i32) -> Result<Quantity, StoreError> {
    Quantity::new(value).map_err(|e| StoreError::DataCorruption(e.to_string()))
}

impl StoreTx for MemoryTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.products.get(&id).cloned())
    }

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, StoreError> {
        let id = ProductId::new(next_id(&self.shared.sequences.product));
        let now = Utc::now();
        let row = Product {
            id,
            title: product.title,
            price: product.price,
            is_active: product.is_active,
            created_at: now,
            updated_at: now,
        };
        Arc::make_mut(&mut self.tables.products).insert(id, row.clone());
        self.touch(RowKey::Product(id));
        Ok(row)
    }

    async fn update_product(
        &mut self,
        id: ProductId,
        price: Price,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        let Some(row) = Arc::make_mut(&mut self.tables.products).get_mut(&id) else {
            return Ok(false);
        };
        row.price = price;
        row.is_active = is_active;
        row.updated_at = Utc::now();
        self.touch(RowKey::Product(id));
        Ok(true)
    }

    async fn inventory(&mut self, id: ProductId) -> Result<Option<Inventory>, StoreError> {
        Ok(self.tables.inventory.get(&id).cloned())
    }

    async fn put_inventory(&mut self, inventory: NewInventory) -> Result<Inventory, StoreError> {
        let id = inventory.product_id;
        if !self.tables.products.contains_key(&id) {
            return Err(StoreError::DataCorruption(format!(
                "inventory for unknown product {id}"
            )));
        }
        let reserved_quantity = self
            .tables
            .inventory
            .get(&id)
            .map_or(0, |row| row.reserved_quantity);
        if inventory.quantity < reserved_quantity {
            return Err(StoreError::Aborted(format!(
                "quantity {} below reserved {reserved_quantity} for product {id}",
                inventory.quantity
            )));
        }
        let row = Inventory {
            product_id: id,
            quantity: inventory.quantity,
            reserved_quantity,
            min_stock_level: inventory.min_stock_level,
            max_stock_level: inventory.max_stock_level,
            cost_price: inventory.cost_price,
            updated_at: Utc::now(),
        };
        Arc::make_mut(&mut self.tables.inventory).insert(id, row.clone());
        self.touch(RowKey::Inventory(id));
        Ok(row)
    }

    async fn try_reserve(&mut self, id: ProductId, amount: Quantity) -> Result<bool, StoreError> {
        let Some(row) = Arc::make_mut(&mut self.tables.inventory).get_mut(&id) else {
            return Ok(false);
        };
        if !row.can_reserve(amount) {
            return Ok(false);
        }
        row.reserved_quantity += amount.get();
        row.updated_at = Utc::now();
        self.touch(RowKey::Inventory(id));
        Ok(true)
    }

    async fn release(&mut self, id: ProductId, amount: Quantity) -> Result<bool, StoreError> {
        let Some(row) = Arc::make_mut(&mut self.tables.inventory).get_mut(&id) else {
            return Ok(false);
        };
        row.reserved_quantity = (row.reserved_quantity - amount.get()).max(0);
        row.updated_at = Utc::now();
        self.touch(RowKey::Inventory(id));
        Ok(true)
    }

    async fn low_stock_count(&mut self) -> Result<i64, StoreError> {
        let count = self
            .tables
            .inventory
            .values()
            .filter(|row| {
                row.min_stock_level > 0
                    && row.available() > 0
                    && row.available() <= row.min_stock_level
                    && self
                        .tables
                        .products
                        .get(&row.product_id)
                        .is_some_and(|p| p.is_active)
            })
            .count();
        i64::try_from(count).map_err(|e| StoreError::DataCorruption(e.to_string()))
    }

    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<Cart>, StoreError> {
        Ok(self.tables.carts.get(&user_id).cloned())
    }

    async fn get_or_create_cart(&mut self, user_id: UserId) -> Result<Cart, StoreError> {
        if let Some(cart) = self.tables.carts.get(&user_id) {
            return Ok(cart.clone());
        }
        let now = Utc::now();
        let cart = Cart {
            id: CartId::new(next_id(&self.shared.sequences.cart)),
            user_id,
            created_at: now,
            updated_at: now,
        };
        Arc::make_mut(&mut self.tables.carts).insert(user_id, cart.clone());
        self.touch(RowKey::Cart(user_id));
        Ok(cart)
    }

    async fn cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>, StoreError> {
        Ok(self.tables.cart_items.get(&(cart_id, product_id)).cloned())
    }

    async fn add_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        delta: Quantity,
    ) -> Result<CartItem, StoreError> {
        let now = Utc::now();
        let cart_items = Arc::make_mut(&mut self.tables.cart_items);
        let item = match cart_items.get_mut(&(cart_id, product_id)) {
            Some(existing) => {
                existing.quantity = quantity(existing.quantity.get().saturating_add(delta.get()))?;
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let item = CartItem {
                    id: CartItemId::new(next_id(&self.shared.sequences.cart_item)),
                    cart_id,
                    product_id,
                    quantity: delta,
                    created_at: now,
                    updated_at: now,
                };
                cart_items.insert((cart_id, product_id), item.clone());
                item
            }
        };
        self.touch(RowKey::CartItem(cart_id, product_id));
        Ok(item)
    }

    async fn decrement_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<i32, StoreError> {
        let key = (cart_id, product_id);
        let Some(item) = self.tables.cart_items.get(&key) else {
            return Ok(0);
        };
        let remaining = match Quantity::new(item.quantity.get() - 1) {
            Ok(remaining) => {
                let item = Arc::make_mut(&mut self.tables.cart_items)
                    .get_mut(&key)
                    .ok_or_else(|| StoreError::DataCorruption("cart line vanished".to_owned()))?;
                item.quantity = remaining;
                item.updated_at = Utc::now();
                remaining.get()
            }
            Err(_) => {
                Arc::make_mut(&mut self.tables.cart_items).remove(&key);
                0
            }
        };
        self.touch(RowKey::CartItem(cart_id, product_id));
        Ok(remaining)
    }

    async fn delete_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<bool, StoreError> {
        if !self.tables.cart_items.contains_key(&(cart_id, product_id)) {
            return Ok(false);
        }
        Arc::make_mut(&mut self.tables.cart_items).remove(&(cart_id, product_id));
        self.touch(RowKey::CartItem(cart_id, product_id));
        Ok(true)
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>, StoreError> {
        let mut lines: Vec<CartLine> = self
            .tables
            .cart_items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .filter_map(|item| {
                let product = self.tables.products.get(&item.product_id)?;
                product.is_active.then(|| CartLine {
                    item: item.clone(),
                    product: product.clone(),
                })
            })
            .collect();
        lines.sort_by(|a, b| {
            b.item
                .created_at
                .cmp(&a.item.created_at)
                .then_with(|| b.item.id.cmp(&a.item.id))
        });
        Ok(lines)
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64, StoreError> {
        let keys: Vec<(CartId, ProductId)> = self
            .tables
            .cart_items
            .keys()
            .filter(|(cart, _)| *cart == cart_id)
            .copied()
            .collect();
        for (cart, product) in &keys {
            Arc::make_mut(&mut self.tables.cart_items).remove(&(*cart, *product));
            self.touch(RowKey::CartItem(*cart, *product));
        }
        Ok(keys.len() as u64)
    }

    async fn insert_order(
        &mut self,
        user_id: UserId,
        total_amount: Decimal,
        status: OrderStatus,
    ) -> Result<Order, StoreError> {
        let id = OrderId::new(next_id(&self.shared.sequences.order));
        let now = Utc::now();
        let order = Order {
            id,
            user_id,
            total_amount,
            status,
            created_at: now,
            updated_at: now,
        };
        Arc::make_mut(&mut self.tables.orders).insert(id, order.clone());
        self.touch(RowKey::Order(id));
        Ok(order)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem, StoreError> {
        let id = OrderItemId::new(next_id(&self.shared.sequences.order_item));
        let row = OrderItem {
            id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
        };
        Arc::make_mut(&mut self.tables.order_items).insert(id, row.clone());
        self.touch(RowKey::OrderItem(id));
        Ok(row)
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        let Some(order) = Arc::make_mut(&mut self.tables.orders).get_mut(&id) else {
            return Ok(false);
        };
        if order.status != from {
            return Ok(false);
        }
        order.status = to;
        order.updated_at = Utc::now();
        self.touch(RowKey::Order(id));
        Ok(true)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.orders.get(&id).cloned())
    }

    async fn user_orders(&mut self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .tables
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .tables
            .order_items
            .values()
            .filter(|item| item.order_id == id)
            .cloned()
            .collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.publish()
    }

    async fn rollback(self) -> Result<(), StoreError> {
        tracing::debug!(rows = self.writes.len(), "memory transaction rolled back");
        Ok(())
    }
}
