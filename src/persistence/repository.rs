//! Repository traits for data access abstraction
//!
//! The settlement coordinator only sees these capability contracts:
//! - [`LedgerStore`] for reads and for opening units of work
//! - [`UnitOfWork`] for locked reads and staged writes that commit together
//!
//! Dropping a [`UnitOfWork`] without calling `commit` rolls back every
//! staged write and releases its row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::account::Account;
use crate::core_types::{AccountNumber, TransactionId, UserId};
use crate::error::LedgerError;
use crate::ledger::Transaction;
use crate::transfer::{Transfer, TransferRole, TransferStatus};

// ============================================================================
// Unit of Work
// ============================================================================

/// One atomic settlement scope
///
/// Rows read through `lock_*` stay locked against other units until this
/// unit commits or is dropped.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read an account and hold its row lock
    async fn lock_account(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, LedgerError>;

    /// Stage a new balance for an account locked by this unit
    async fn write_balance(&mut self, account: &Account) -> Result<(), LedgerError>;

    /// Ledger of an account, oldest first, as seen by this unit
    ///
    /// Consistent with the balance returned by `lock_account` for the same
    /// account, since every writer appends while holding that row lock.
    async fn ledger_entries(
        &mut self,
        account: &AccountNumber,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Stage an append-only ledger entry
    async fn append_transaction(&mut self, entry: &Transaction) -> Result<(), LedgerError>;

    /// Stage a new transfer row
    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), LedgerError>;

    /// Read a transfer by its send-side transaction id and hold its row lock
    async fn lock_transfer(
        &mut self,
        id: &TransactionId,
    ) -> Result<Option<Transfer>, LedgerError>;

    /// CAS update: write `transfer` only if the stored status is `expected`
    ///
    /// Returns false if the status didn't match.
    async fn update_transfer_if(
        &mut self,
        transfer: &Transfer,
        expected: TransferStatus,
    ) -> Result<bool, LedgerError>;

    /// Make every staged write durable at once
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

// ============================================================================
// Ledger Store
// ============================================================================

/// Durable accounts, ledger entries and transfers
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &'static str;

    /// Open a new unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError>;

    /// Insert a new account
    ///
    /// Returns false if the account number is already taken.
    async fn insert_account(&self, account: &Account) -> Result<bool, LedgerError>;

    /// Get account by number (unlocked read)
    async fn get_account(&self, number: &AccountNumber) -> Result<Option<Account>, LedgerError>;

    /// All accounts owned by a user, oldest first
    async fn accounts_by_owner(&self, owner: UserId) -> Result<Vec<Account>, LedgerError>;

    /// Most recent ledger entries across `accounts`, newest first
    async fn recent_transactions(
        &self,
        accounts: &[AccountNumber],
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Full ledger of one account, oldest first
    async fn transactions_for_account(
        &self,
        account: &AccountNumber,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Get transfer by its send-side transaction id (unlocked read)
    async fn get_transfer(&self, id: &TransactionId) -> Result<Option<Transfer>, LedgerError>;

    /// Transfers a user sent or received, newest first
    async fn transfers_for_user(
        &self,
        user: UserId,
        role: TransferRole,
    ) -> Result<Vec<Transfer>, LedgerError>;

    /// PENDING transfers whose deadline is at or before `now`, oldest deadline first
    async fn find_overdue_transfers(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TransactionId>, LedgerError>;
}
