//! Money Conversion Module
//!
//! Conversion between client-facing decimal strings and the internal
//! [`MinorUnits`] representation. Balances carry two implied decimal places
//! (cents); anything finer is rejected rather than rounded.
//!
//! ```rust
//! use settlement_ledger::money::{format_amount, parse_amount};
//!
//! assert_eq!(parse_amount("12.5").unwrap(), 1250);
//! assert_eq!(format_amount(1250), "12.50");
//! ```

use rust_decimal::prelude::*;
use thiserror::Error;

use crate::core_types::MinorUnits;

/// Implied decimal places of [`MinorUnits`]
pub const MINOR_UNIT_DECIMALS: u32 = 2;

/// Money conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Convert a client string amount ("12.34") to minor units (1234)
pub fn parse_amount(amount_str: &str) -> Result<MinorUnits, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }
    if amount_str.starts_with('+') {
        return Err(MoneyError::InvalidFormat("explicit sign".into()));
    }
    if amount_str.starts_with('.') || amount_str.ends_with('.') {
        return Err(MoneyError::InvalidFormat(
            "use 0.5 instead of .5 and 5.0 instead of 5.".into(),
        ));
    }

    let decimal = Decimal::from_str_exact(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;

    parse_decimal(decimal)
}

/// Convert a validated Decimal to minor units
pub fn parse_decimal(decimal: Decimal) -> Result<MinorUnits, MoneyError> {
    if decimal.is_sign_negative() || decimal.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let normalized = decimal.normalize();
    if normalized.scale() > MINOR_UNIT_DECIMALS {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: MINOR_UNIT_DECIMALS,
        });
    }

    let scaled = normalized
        .checked_mul(Decimal::from(10i64.pow(MINOR_UNIT_DECIMALS)))
        .ok_or(MoneyError::Overflow)?;

    scaled.to_i64().ok_or(MoneyError::Overflow)
}

/// Convert minor units to a display string with exactly two decimals
pub fn format_amount(value: MinorUnits) -> String {
    let decimal = Decimal::new(value, MINOR_UNIT_DECIMALS);
    format!("{:.prec$}", decimal, prec = MINOR_UNIT_DECIMALS as usize)
}
