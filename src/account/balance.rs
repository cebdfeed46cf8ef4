//! BALANCE MUTATOR
//!
//! The single place where an account balance changes value.
//!
//! # Enforcement Strategy:
//! 1. Pure function over a locked copy - the caller's unit of work holds the
//!    row lock taken when the account was read, so check and write are one
//!    isolated step
//! 2. checked_add - overflow protection
//! 3. Debits that would go below zero are rejected, never clamped

use crate::account::Account;
use crate::core_types::MinorUnits;
use crate::error::LedgerError;

/// Apply a signed delta to an account balance
///
/// Positive deltas credit, negative deltas debit.
///
/// # Errors
/// - `InvalidAmount` if `delta == 0`
/// - `InsufficientFunds` if `balance + delta < 0`
/// - `Overflow` on arithmetic overflow
pub fn apply_delta(account: &Account, delta: MinorUnits) -> Result<Account, LedgerError> {
    if delta == 0 {
        return Err(LedgerError::InvalidAmount);
    }

    let balance = account
        .balance
        .checked_add(delta)
        .ok_or(LedgerError::Overflow)?;

    if balance < 0 {
        return Err(LedgerError::InsufficientFunds {
            available: account.balance,
            requested: delta.saturating_neg(),
        });
    }

    Ok(Account {
        balance,
        ..account.clone()
    })
}
