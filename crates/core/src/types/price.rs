//! Type-safe unit price using decimal arithmetic.
//!
//! Prices never go through floating point: a line total is computed as an
//! exact `Decimal` product so that a client total and a server-computed total
//! can be compared for equality without tolerance.
//!
//! Prices, line totals and order totals share one domain: at most two
//! decimal places and at most [`Price::MAX_AMOUNT`], matching the
//! `NUMERIC(12, 2)` columns they are stored in.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Quantity;

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative (got {0})")]
    Negative(Decimal),
    /// The amount has more than two decimal places.
    #[error("price has more than two decimal places (got {0})")]
    TooPrecise(Decimal),
    /// The amount is above [`Price::MAX_AMOUNT`].
    #[error("price exceeds {max} (got {0})", max = Price::MAX_AMOUNT)]
    TooLarge(Decimal),
    /// The input string is not a decimal number.
    #[error("invalid price: {0}")]
    Invalid(String),
}

/// A non-negative unit price in the store currency, in cents precision.
///
/// ## Examples
///
/// ```
/// use cartwright_core::{Price, Quantity};
/// use rust_decimal::Decimal;
///
/// let price: Price = "10.00".parse().unwrap();
/// let quantity = Quantity::new(2).unwrap();
/// assert_eq!(price.line_total(quantity), Some(Decimal::new(2000, 2)));
///
/// assert!("-1".parse::<Price>().is_err());
/// assert!("0.001".parse::<Price>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// A price of zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest amount a price, line total or order total may hold:
    /// `9999999999.99`.
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

    /// Create a price from a decimal amount.
    ///
    /// Trailing zeros do not count as precision: `1.500` is accepted.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if `amount` is below zero,
    /// `PriceError::TooPrecise` if it has fractions of a cent and
    /// `PriceError::TooLarge` if it exceeds [`Self::MAX_AMOUNT`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        if amount.normalize().scale() > 2 {
            return Err(PriceError::TooPrecise(amount));
        }
        if amount > Self::MAX_AMOUNT {
            return Err(PriceError::TooLarge(amount));
        }
        Ok(Self(amount))
    }

    /// Get the decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Total for `quantity` units at this price, or `None` if it would
    /// exceed [`Self::MAX_AMOUNT`].
    #[must_use]
    pub fn line_total(&self, quantity: Quantity) -> Option<Decimal> {
        self.0
            .checked_mul(Decimal::from(quantity.get()))
            .filter(|total| *total <= Self::MAX_AMOUNT)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim()).map_err(|e| PriceError::Invalid(e.to_string()))?;
        Self::new(amount)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}
