//! ISO 4217 currency codes and their rounding precision.
//!
//! CFDI amounts are rounded to the number of decimal places the SAT currency
//! catalog (c_Moneda) assigns to the document currency. The precision is
//! threaded explicitly as a [`Rounder`] into every computation — there is no
//! process-wide default.

use rust_decimal::{Decimal, RoundingStrategy};

use super::error::CfdiError;

/// Decimal places for `code`, or [`CfdiError::UnknownCurrency`].
pub fn decimals_for(code: &str) -> Result<u32, CfdiError> {
    CURRENCY_DECIMALS
        .binary_search_by_key(&code, |(c, _)| *c)
        .map(|idx| CURRENCY_DECIMALS[idx].1)
        .map_err(|_| CfdiError::UnknownCurrency(code.to_string()))
}

/// Currency-specific half-up rounding.
///
/// Rounded values are rescaled to the currency precision so canonical
/// rendering keeps trailing zeros (`360000.00`, never `360000`).
#[derive(Debug, Clone, Copy)]
pub struct Rounder {
    decimals: u32,
}

impl Rounder {
    /// Rounder for the given currency code.
    pub fn for_currency(code: &str) -> Result<Self, CfdiError> {
        decimals_for(code).map(|decimals| Self { decimals })
    }

    /// Rounder with an explicit precision.
    pub fn new(decimals: u32) -> Self {
        Self { decimals }
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Round half-up (commercial rounding) to the currency precision.
    pub fn round(&self, value: Decimal) -> Decimal {
        let mut rounded =
            value.round_dp_with_strategy(self.decimals, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(self.decimals);
        rounded
    }
}

/// Sorted list of (ISO 4217 code, decimal places) from the SAT c_Moneda
/// catalog. Sorted for binary search.
static CURRENCY_DECIMALS: &[(&str, u32)] = &[
    ("AUD", 2), // Australian Dollar
    ("BRL", 2), // Brazilian Real
    ("CAD", 2), // Canadian Dollar
    ("CHF", 2), // Swiss Franc
    ("CLP", 0), // Chilean Peso
    ("CNY", 2), // Chinese Yuan
    ("COP", 2), // Colombian Peso
    ("EUR", 2), // Euro
    ("GBP", 2), // Pound Sterling
    ("GTQ", 2), // Guatemalan Quetzal
    ("HKD", 2), // Hong Kong Dollar
    ("INR", 2), // Indian Rupee
    ("JPY", 0), // Japanese Yen
    ("KRW", 0), // South Korean Won
    ("MXN", 2), // Mexican Peso
    ("NZD", 2), // New Zealand Dollar
    ("PEN", 2), // Peruvian Sol
    ("SEK", 2), // Swedish Krona
    ("SGD", 2), // Singapore Dollar
    ("USD", 2), // US Dollar
    ("XXX", 0), // No currency (payment comprobantes)
];
