//! Status enums for orders and stock.

use serde::{Deserialize, Serialize};

/// Lifecycle of an order.
///
/// Checkout creates an order in `Pending` and moves it to `Processing` in the
/// same transaction, so a committed order is never observed as `Pending`
/// unless it was written by other tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created, not yet confirmed.
    #[default]
    Pending,
    /// Confirmed; stock is reserved.
    Processing,
    /// Cancelled; reservations have been released.
    Cancelled,
    /// Fulfilled.
    Completed,
}

impl OrderStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing | Self::Cancelled)
                | (Self::Processing, Self::Completed | Self::Cancelled)
        )
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Whether an order in this status holds stock reservations.
    #[must_use]
    pub const fn holds_reservation(self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Lowercase name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Stock classification shown next to a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// Classify available stock against the low-water mark.
    ///
    /// `None` means the product has no inventory row at all.
    #[must_use]
    pub const fn classify(levels: Option<(i32, i32)>) -> Self {
        match levels {
            None => Self::OutOfStock,
            Some((available, _)) if available <= 0 => Self::OutOfStock,
            Some((available, min_stock_level)) if available <= min_stock_level => Self::LowStock,
            Some(_) => Self::InStock,
        }
    }
}
