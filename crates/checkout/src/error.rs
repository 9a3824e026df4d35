//! Error taxonomy for checkout operations.

use rust_decimal::Decimal;
use thiserror::Error;

use cartwright_core::{OrderId, OrderStatus, Price, PriceError, ProductId, QuantityError};

use crate::store::StoreError;

/// Coarse classification of a [`CheckoutError`], for callers that map
/// failures onto a transport (HTTP status, CLI exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Product, cart item or order absent. User-correctable.
    NotFound,
    /// Malformed input rejected before any storage access.
    Validation,
    /// Business rule: not enough available stock.
    InsufficientStock,
    /// Client total is stale.
    PriceMismatch,
    /// Request conflicts with the current state of the entity.
    Conflict,
    /// Storage failure or upstream timeout. See
    /// [`CheckoutError::is_retryable`] for which ones are worth repeating.
    TransactionFailure,
}

/// Errors returned by the checkout operations.
///
/// Every variant carries enough context for the caller to decide whether to
/// retry with corrected input.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("total amount must be greater than zero (got {0})")]
    InvalidTotal(Decimal),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),

    #[error("invalid price: {0}")]
    InvalidPrice(#[from] PriceError),

    #[error("amount exceeds the maximum of {}", Price::MAX_AMOUNT)]
    AmountOutOfRange,

    #[error("invalid stock levels: {0}")]
    InvalidStockLevels(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("product {0} is not in the cart")]
    CartItemNotFound(ProductId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error(
        "insufficient stock for product {product_id}: {available} available, {requested} requested"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
        requested: i32,
    },

    #[error("price mismatch: calculated {calculated}, requested {requested}")]
    PriceMismatch {
        calculated: Decimal,
        requested: Decimal,
    },

    #[error("order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("price lookup for product {0} timed out")]
    PriceLookupTimeout(ProductId),

    #[error("transaction failed: {0}")]
    Transaction(#[from] StoreError),
}

impl CheckoutError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ProductNotFound(_) | Self::CartItemNotFound(_) | Self::OrderNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::EmptyCart
            | Self::InvalidTotal(_)
            | Self::InvalidQuantity(_)
            | Self::InvalidPrice(_)
            | Self::AmountOutOfRange
            | Self::InvalidStockLevels(_) => ErrorKind::Validation,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::PriceMismatch { .. } => ErrorKind::PriceMismatch,
            Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::PriceLookupTimeout(_) | Self::Transaction(_) => ErrorKind::TransactionFailure,
        }
    }

    /// HTTP-class status code for the error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 400,
            ErrorKind::InsufficientStock | ErrorKind::PriceMismatch | ErrorKind::Conflict => 409,
            ErrorKind::TransactionFailure => 503,
        }
    }

    /// Whether repeating the same request unchanged may succeed.
    ///
    /// Timeouts and transient storage failures qualify. Storage errors that
    /// will recur, such as corrupt rows or a poisoned lock, do not, even
    /// though they share the `TransactionFailure` kind.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::PriceLookupTimeout(_) => true,
            Self::Transaction(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Result alias for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
