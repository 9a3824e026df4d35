//! Domain models for the checkout core.
//!
//! Row-shaped structs returned by the store plus the request/response shapes
//! of the public operations.

pub mod cart;
pub mod inventory;
pub mod order;
pub mod product;

pub use cart::{Cart, CartItem, CartLine};
pub use inventory::{Inventory, NewInventory, StockCheck, StockLevels};
pub use order::{CheckoutLine, NewOrderItem, Order, OrderDetails, OrderItem, OrderReceipt};
pub use product::{NewProduct, Product};
