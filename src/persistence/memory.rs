//! In-memory ledger store
//!
//! Mirrors the PostgreSQL semantics the coordinator relies on:
//! - per-row locks held for the life of a unit of work (`SELECT ... FOR UPDATE`)
//! - staged writes that become visible only on commit
//! - unique transaction ids and `balance >= 0` checked at commit
//!
//! Faults can be injected to exercise rollback paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::repository::{LedgerStore, UnitOfWork};
use crate::account::Account;
use crate::core_types::{AccountNumber, TransactionId, UserId};
use crate::error::LedgerError;
use crate::ledger::Transaction;
use crate::transfer::{Transfer, TransferRole, TransferStatus};

/// Store operation that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    AccountInsert,
    BalanceWrite,
    TransactionAppend,
    TransferInsert,
    TransferUpdate,
    Commit,
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountNumber, Account>,
    /// Append order doubles as the tie-breaker for equal timestamps
    transactions: Vec<Transaction>,
    transaction_ids: HashSet<TransactionId>,
    transfers: HashMap<TransactionId, Transfer>,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    account_locks: DashMap<AccountNumber, Arc<RowLock<()>>>,
    transfer_locks: DashMap<TransactionId, Arc<RowLock<()>>>,
    faults: Mutex<HashSet<Fault>>,
}

impl Inner {
    /// Consume a one-shot fault if armed
    fn trip(&self, fault: Fault) -> Result<(), LedgerError> {
        if self.faults.lock().remove(&fault) {
            Err(LedgerError::PersistenceFailure(format!(
                "injected fault: {:?}",
                fault
            )))
        } else {
            Ok(())
        }
    }
}

/// In-memory [`LedgerStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next occurrence of `fault` fail with `PersistenceFailure`
    pub fn fail_next(&self, fault: Fault) {
        self.inner.faults.lock().insert(fault);
    }

    /// Number of committed ledger entries
    pub fn transaction_count(&self) -> usize {
        self.inner.tables.lock().transactions.len()
    }

    /// Number of committed transfers
    pub fn transfer_count(&self) -> usize {
        self.inner.tables.lock().transfers.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        Ok(Box::new(MemoryUnitOfWork::new(self.inner.clone())))
    }

    async fn insert_account(&self, account: &Account) -> Result<bool, LedgerError> {
        self.inner.trip(Fault::AccountInsert)?;

        let mut tables = self.inner.tables.lock();
        if tables.accounts.contains_key(&account.account_number) {
            return Ok(false);
        }
        tables
            .accounts
            .insert(account.account_number.clone(), account.clone());
        Ok(true)
    }

    async fn get_account(&self, number: &AccountNumber) -> Result<Option<Account>, LedgerError> {
        Ok(self.inner.tables.lock().accounts.get(number).cloned())
    }

    async fn accounts_by_owner(&self, owner: UserId) -> Result<Vec<Account>, LedgerError> {
        let tables = self.inner.tables.lock();
        let mut accounts: Vec<Account> = tables
            .accounts
            .values()
            .filter(|a| a.owner_id == owner)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.account_number.cmp(&b.account_number))
        });
        Ok(accounts)
    }

    async fn recent_transactions(
        &self,
        accounts: &[AccountNumber],
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let wanted: HashSet<&AccountNumber> = accounts.iter().collect();
        let tables = self.inner.tables.lock();

        // Newest append first, then a stable sort keeps that order for ties
        let mut entries: Vec<Transaction> = tables
            .transactions
            .iter()
            .rev()
            .filter(|t| wanted.contains(&t.account_number))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn transactions_for_account(
        &self,
        account: &AccountNumber,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .transactions
            .iter()
            .filter(|t| &t.account_number == account)
            .cloned()
            .collect())
    }

    async fn get_transfer(&self, id: &TransactionId) -> Result<Option<Transfer>, LedgerError> {
        Ok(self.inner.tables.lock().transfers.get(id).cloned())
    }

    async fn transfers_for_user(
        &self,
        user: UserId,
        role: TransferRole,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let tables = self.inner.tables.lock();
        let mut transfers: Vec<Transfer> = tables
            .transfers
            .values()
            .filter(|t| match role {
                TransferRole::Sender => t.sender_id == user,
                TransferRole::Receiver => t.receiver_id == user,
            })
            .cloned()
            .collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transfers)
    }

    async fn find_overdue_transfers(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TransactionId>, LedgerError> {
        let tables = self.inner.tables.lock();
        let mut overdue: Vec<&Transfer> = tables
            .transfers
            .values()
            .filter(|t| t.status == TransferStatus::Pending && t.is_overdue(now))
            .collect();
        overdue.sort_by_key(|t| t.expires_at);
        Ok(overdue
            .into_iter()
            .take(limit)
            .map(|t| t.transaction_id)
            .collect())
    }
}

/// Staged writes plus the row locks guarding them
struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    locked_accounts: HashSet<AccountNumber>,
    locked_transfers: HashSet<TransactionId>,
    balances: HashMap<AccountNumber, Account>,
    transactions: Vec<Transaction>,
    new_transfers: Vec<Transfer>,
    transfer_updates: HashMap<TransactionId, Transfer>,
}

impl MemoryUnitOfWork {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            guards: Vec::new(),
            locked_accounts: HashSet::new(),
            locked_transfers: HashSet::new(),
            balances: HashMap::new(),
            transactions: Vec::new(),
            new_transfers: Vec::new(),
            transfer_updates: HashMap::new(),
        }
    }

    fn transaction_id_taken(&self, id: &TransactionId) -> bool {
        self.transactions.iter().any(|t| &t.transaction_id == id)
            || self.inner.tables.lock().transaction_ids.contains(id)
    }

    fn current_transfer(&self, id: &TransactionId) -> Option<Transfer> {
        if let Some(updated) = self.transfer_updates.get(id) {
            return Some(updated.clone());
        }
        if let Some(created) = self.new_transfers.iter().find(|t| &t.transaction_id == id) {
            return Some(created.clone());
        }
        self.inner.tables.lock().transfers.get(id).cloned()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_account(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, LedgerError> {
        if !self.locked_accounts.contains(number) {
            // Missing rows get no lock entry; accounts are never deleted
            if !self.inner.tables.lock().accounts.contains_key(number) {
                return Ok(None);
            }
            let lock = Arc::clone(
                self.inner
                    .account_locks
                    .entry(number.clone())
                    .or_default()
                    .value(),
            );
            self.guards.push(lock.lock_owned().await);
            self.locked_accounts.insert(number.clone());
        }

        if let Some(staged) = self.balances.get(number) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.inner.tables.lock().accounts.get(number).cloned())
    }

    async fn write_balance(&mut self, account: &Account) -> Result<(), LedgerError> {
        self.inner.trip(Fault::BalanceWrite)?;

        if !self.locked_accounts.contains(&account.account_number) {
            return Err(LedgerError::PersistenceFailure(format!(
                "balance write to unlocked account {}",
                account.account_number
            )));
        }
        self.balances
            .insert(account.account_number.clone(), account.clone());
        Ok(())
    }

    async fn ledger_entries(
        &mut self,
        account: &AccountNumber,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let tables = self.inner.tables.lock();
        Ok(tables
            .transactions
            .iter()
            .chain(self.transactions.iter())
            .filter(|t| &t.account_number == account)
            .cloned()
            .collect())
    }

    async fn append_transaction(&mut self, entry: &Transaction) -> Result<(), LedgerError> {
        self.inner.trip(Fault::TransactionAppend)?;

        if self.transaction_id_taken(&entry.transaction_id) {
            return Err(LedgerError::PersistenceFailure(format!(
                "duplicate transaction id {}",
                entry.transaction_id
            )));
        }
        self.transactions.push(entry.clone());
        Ok(())
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), LedgerError> {
        self.inner.trip(Fault::TransferInsert)?;

        if self.current_transfer(&transfer.transaction_id).is_some() {
            return Err(LedgerError::PersistenceFailure(format!(
                "duplicate transfer {}",
                transfer.transaction_id
            )));
        }
        self.new_transfers.push(transfer.clone());
        Ok(())
    }

    async fn lock_transfer(
        &mut self,
        id: &TransactionId,
    ) -> Result<Option<Transfer>, LedgerError> {
        if !self.locked_transfers.contains(id) {
            if self.current_transfer(id).is_none() {
                return Ok(None);
            }
            let lock = Arc::clone(self.inner.transfer_locks.entry(*id).or_default().value());
            self.guards.push(lock.lock_owned().await);
            self.locked_transfers.insert(*id);
        }
        Ok(self.current_transfer(id))
    }

    async fn update_transfer_if(
        &mut self,
        transfer: &Transfer,
        expected: TransferStatus,
    ) -> Result<bool, LedgerError> {
        self.inner.trip(Fault::TransferUpdate)?;

        let id = transfer.transaction_id;
        if !self.locked_transfers.contains(&id) {
            return Err(LedgerError::PersistenceFailure(format!(
                "update of unlocked transfer {}",
                id
            )));
        }
        match self.current_transfer(&id) {
            Some(current) if current.status == expected => {
                self.transfer_updates.insert(id, transfer.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.inner.trip(Fault::Commit)?;

        let mut tables = self.inner.tables.lock();

        // Constraint checks first so a violation leaves nothing applied
        if let Some(negative) = self.balances.values().find(|a| a.balance < 0) {
            return Err(LedgerError::PersistenceFailure(format!(
                "check constraint violated: balance of {} below zero",
                negative.account_number
            )));
        }
        if let Some(dup) = self
            .transactions
            .iter()
            .find(|t| tables.transaction_ids.contains(&t.transaction_id))
        {
            return Err(LedgerError::PersistenceFailure(format!(
                "duplicate transaction id {}",
                dup.transaction_id
            )));
        }

        for (number, account) in &self.balances {
            tables.accounts.insert(number.clone(), account.clone());
        }
        for entry in &self.transactions {
            tables.transaction_ids.insert(entry.transaction_id);
            tables.transactions.push(entry.clone());
        }
        for transfer in &self.new_transfers {
            tables
                .transfers
                .insert(transfer.transaction_id, transfer.clone());
        }
        for (id, transfer) in &self.transfer_updates {
            tables.transfers.insert(*id, transfer.clone());
        }

        // Row locks release when `self.guards` drops
        Ok(())
    }
}
