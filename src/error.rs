//! Ledger Error Types
//!
//! Every failure a settlement operation can surface. Each variant maps to a
//! distinct code so the request layer never collapses them.

use thiserror::Error;

use crate::core_types::{AccountNumber, MinorUnits, TransactionId};
use crate::transfer::TransferStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Not Found ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountNumber),

    #[error("Transfer not found: {0}")]
    TransferNotFound(TransactionId),

    // === Authorization ===
    #[error("Caller is not the owner of account {0}")]
    NotOwner(AccountNumber),

    #[error("Caller is not the receiver of transfer {0}")]
    NotReceiver(TransactionId),

    // === Business Rules ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: MinorUnits,
        requested: MinorUnits,
    },

    #[error("Amount would cause overflow")]
    Overflow,

    #[error("Transfer {id} is {status}, not PENDING")]
    TransferNotPending {
        id: TransactionId,
        status: TransferStatus,
    },

    #[error("Transfer {0} has expired")]
    TransferExpired(TransactionId),

    // === Storage ===
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            LedgerError::NotOwner(_) => "NOT_OWNER",
            LedgerError::NotReceiver(_) => "NOT_RECEIVER",
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::Overflow => "OVERFLOW",
            LedgerError::TransferNotPending { .. } => "TRANSFER_NOT_PENDING",
            LedgerError::TransferExpired(_) => "TRANSFER_EXPIRED",
            LedgerError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::TransferNotFound(_) => 404,
            LedgerError::NotOwner(_) | LedgerError::NotReceiver(_) => 403,
            LedgerError::InvalidAmount | LedgerError::Overflow => 400,
            LedgerError::TransferNotPending { .. } | LedgerError::TransferExpired(_) => 409,
            LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::PersistenceFailure(_) => 503,
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::PersistenceFailure(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::PersistenceFailure(e.to_string())
    }
}
