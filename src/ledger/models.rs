//! Ledger entry definitions
//!
//! Kind and side IDs are stored in PostgreSQL as SMALLINT.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountNumber, MinorUnits, TransactionId};

/// What caused a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransactionKind {
    Deposit = 1,
    Withdraw = 2,
    Transfer = 3,
}

impl TransactionKind {
    /// Get the numeric kind ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL kind ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TransactionKind::Deposit),
            2 => Some(TransactionKind::Withdraw),
            3 => Some(TransactionKind::Transfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdraw => "WITHDRAW",
            TransactionKind::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of the balance change an entry records
///
/// TRANSFER entries appear on both legs, so the kind alone does not give
/// the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum EntrySide {
    Credit = 1,
    Debit = -1,
}

impl EntrySide {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(EntrySide::Credit),
            -1 => Some(EntrySide::Debit),
            _ => None,
        }
    }

    /// Sign the positive magnitude `amount`
    #[inline]
    pub fn apply(&self, amount: MinorUnits) -> MinorUnits {
        match self {
            EntrySide::Credit => amount,
            EntrySide::Debit => -amount,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySide::Credit => "CREDIT",
            EntrySide::Debit => "DEBIT",
        }
    }
}

impl fmt::Display for EntrySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub account_number: AccountNumber,
    /// Positive magnitude in minor units
    pub amount: MinorUnits,
    pub kind: TransactionKind,
    pub side: EntrySide,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Balance delta this entry accounts for
    pub fn signed_amount(&self) -> MinorUnits {
        self.side.apply(self.amount)
    }
}
