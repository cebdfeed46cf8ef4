//! Settlement Coordinator
//!
//! Runs every money-moving operation as one unit of work: lock, validate,
//! mutate the balance, append the ledger entry, commit. Any error before
//! commit drops the unit, which rolls back every staged write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::account::{Account, apply_delta};
use crate::config::SettlementConfig;
use crate::core_types::{AccountNumber, MinorUnits, TransactionId, UserId};
use crate::error::LedgerError;
use crate::ledger::{EntrySide, LedgerRecorder, Transaction, TransactionKind};
use crate::persistence::{LedgerStore, UnitOfWork};
use crate::transfer::{Transfer, TransferRole, TransferStatus};

/// Result of a committed send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransfer {
    /// Sender balance after the debit
    pub balance: MinorUnits,
    /// The PENDING transfer, keyed by the sender's debit entry
    pub transfer: Transfer,
}

/// Balance checked against the ledger of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub account_number: AccountNumber,
    pub balance: MinorUnits,
    pub ledger_sum: MinorUnits,
    pub entries: usize,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.balance == self.ledger_sum
    }
}

pub struct SettlementCoordinator {
    store: Arc<dyn LedgerStore>,
    config: SettlementConfig,
}

impl SettlementCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, config: SettlementConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: Arc<dyn LedgerStore>) -> Self {
        Self::new(store, SettlementConfig::default())
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Open a zero-balance account under a fresh number
    pub async fn create_account(&self, owner: UserId) -> Result<Account, LedgerError> {
        let attempts = self.config.account_number_attempts.max(1);
        for attempt in 1..=attempts {
            let account = Account::open(owner);
            if self.store.insert_account(&account).await? {
                info!(
                    owner,
                    account = %account.account_number,
                    "Account opened"
                );
                return Ok(account);
            }
            warn!(
                owner,
                account = %account.account_number,
                attempt,
                "Account number collision, retrying"
            );
        }

        Err(LedgerError::PersistenceFailure(format!(
            "no free account number after {} attempts",
            attempts
        )))
    }

    pub async fn list_accounts(&self, owner: UserId) -> Result<Vec<Account>, LedgerError> {
        self.store.accounts_by_owner(owner).await
    }

    // ========================================================================
    // Deposit / Withdraw
    // ========================================================================

    /// Credit an owned account, returning the new balance
    pub async fn deposit(
        &self,
        account_number: &AccountNumber,
        amount: MinorUnits,
        caller: UserId,
    ) -> Result<MinorUnits, LedgerError> {
        self.settle_single(
            account_number,
            amount,
            caller,
            TransactionKind::Deposit,
            EntrySide::Credit,
        )
        .await
        .inspect_err(|e| log_rejected("deposit", account_number, amount, e))
    }

    /// Debit an owned account, returning the new balance
    pub async fn withdraw(
        &self,
        account_number: &AccountNumber,
        amount: MinorUnits,
        caller: UserId,
    ) -> Result<MinorUnits, LedgerError> {
        self.settle_single(
            account_number,
            amount,
            caller,
            TransactionKind::Withdraw,
            EntrySide::Debit,
        )
        .await
        .inspect_err(|e| log_rejected("withdraw", account_number, amount, e))
    }

    async fn settle_single(
        &self,
        account_number: &AccountNumber,
        amount: MinorUnits,
        caller: UserId,
        kind: TransactionKind,
        side: EntrySide,
    ) -> Result<MinorUnits, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let mut uow = self.store.begin().await?;
        let account = lock_owned_account(&mut *uow, account_number, caller).await?;
        let (updated, entry) = settle(&mut *uow, &account, amount, kind, side).await?;
        uow.commit().await?;

        info!(
            account = %account_number,
            transaction_id = %entry.transaction_id,
            kind = %kind,
            amount,
            balance = updated.balance,
            "Settled"
        );
        Ok(updated.balance)
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Debit the sender and open a PENDING transfer to `receiver`
    pub async fn send_transfer(
        &self,
        sender_account: &AccountNumber,
        amount: MinorUnits,
        receiver: UserId,
        caller: UserId,
    ) -> Result<SentTransfer, LedgerError> {
        self.send_inner(sender_account, amount, receiver, caller)
            .await
            .inspect_err(|e| log_rejected("send_transfer", sender_account, amount, e))
    }

    async fn send_inner(
        &self,
        sender_account: &AccountNumber,
        amount: MinorUnits,
        receiver: UserId,
        caller: UserId,
    ) -> Result<SentTransfer, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let mut uow = self.store.begin().await?;
        let account = lock_owned_account(&mut *uow, sender_account, caller).await?;
        let (updated, debit) = settle(
            &mut *uow,
            &account,
            amount,
            TransactionKind::Transfer,
            EntrySide::Debit,
        )
        .await?;

        let transfer = Transfer::new(
            debit.transaction_id,
            caller,
            receiver,
            sender_account.clone(),
            amount,
            debit.created_at,
            self.config.transfer_ttl_secs,
        );
        uow.insert_transfer(&transfer).await?;
        uow.commit().await?;

        info!(
            transaction_id = %transfer.transaction_id,
            account = %sender_account,
            receiver,
            amount,
            expires_at = %transfer.expires_at,
            "Transfer sent"
        );
        Ok(SentTransfer {
            balance: updated.balance,
            transfer,
        })
    }

    /// Credit a PENDING transfer into one of the receiver's accounts
    ///
    /// An overdue transfer is marked EXPIRED (and that change committed)
    /// before `TransferExpired` is returned.
    pub async fn accept_transfer(
        &self,
        transaction_id: &TransactionId,
        receiver_account: &AccountNumber,
        caller: UserId,
    ) -> Result<MinorUnits, LedgerError> {
        self.accept_inner(transaction_id, receiver_account, caller)
            .await
            .inspect_err(|e| {
                warn!(
                    transaction_id = %transaction_id,
                    account = %receiver_account,
                    caller,
                    code = e.code(),
                    error = %e,
                    "accept_transfer rejected"
                )
            })
    }

    async fn accept_inner(
        &self,
        transaction_id: &TransactionId,
        receiver_account: &AccountNumber,
        caller: UserId,
    ) -> Result<MinorUnits, LedgerError> {
        let mut uow = self.store.begin().await?;

        // Lock order: transfer row, then account row
        let transfer = uow
            .lock_transfer(transaction_id)
            .await?
            .ok_or(LedgerError::TransferNotFound(*transaction_id))?;
        // Deadline is judged after any wait on the row lock
        let now = Utc::now();

        if transfer.receiver_id != caller {
            return Err(LedgerError::NotReceiver(*transaction_id));
        }
        if transfer.status != TransferStatus::Pending {
            return Err(LedgerError::TransferNotPending {
                id: *transaction_id,
                status: transfer.status,
            });
        }
        if transfer.is_overdue(now) {
            expire_locked(&mut *uow, &transfer, now).await?;
            uow.commit().await?;
            info!(transaction_id = %transaction_id, "Transfer expired on accept");
            return Err(LedgerError::TransferExpired(*transaction_id));
        }

        let account = lock_owned_account(&mut *uow, receiver_account, caller).await?;
        let (updated, credit) = settle(
            &mut *uow,
            &account,
            transfer.amount,
            TransactionKind::Transfer,
            EntrySide::Credit,
        )
        .await?;

        let accepted = transfer.accepted(receiver_account.clone(), credit.transaction_id, now)?;
        if !uow
            .update_transfer_if(&accepted, TransferStatus::Pending)
            .await?
        {
            return Err(LedgerError::PersistenceFailure(format!(
                "transfer {} changed under row lock",
                transaction_id
            )));
        }
        uow.commit().await?;

        info!(
            transaction_id = %transaction_id,
            account = %receiver_account,
            credit_id = %credit.transaction_id,
            amount = transfer.amount,
            balance = updated.balance,
            "Transfer accepted"
        );
        Ok(updated.balance)
    }

    /// Look up a transfer the caller sent or receives
    pub async fn get_transfer(
        &self,
        transaction_id: &TransactionId,
        caller: UserId,
    ) -> Result<Transfer, LedgerError> {
        match self.store.get_transfer(transaction_id).await? {
            Some(t) if t.sender_id == caller || t.receiver_id == caller => Ok(t),
            _ => Err(LedgerError::TransferNotFound(*transaction_id)),
        }
    }

    /// Transfers addressed to `user`, newest first
    pub async fn incoming_transfers(&self, user: UserId) -> Result<Vec<Transfer>, LedgerError> {
        self.store
            .transfers_for_user(user, TransferRole::Receiver)
            .await
    }

    /// Transfers sent by `user`, newest first
    pub async fn outgoing_transfers(&self, user: UserId) -> Result<Vec<Transfer>, LedgerError> {
        self.store.transfers_for_user(user, TransferRole::Sender).await
    }

    /// Expire up to `limit` PENDING transfers whose deadline is at or before `now`
    ///
    /// Each transfer is expired in its own unit so one failure doesn't
    /// hold back the rest. Returns the number expired.
    pub async fn expire_overdue(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, LedgerError> {
        let candidates = self.store.find_overdue_transfers(now, limit).await?;
        if candidates.is_empty() {
            debug!("No overdue transfers");
            return Ok(0);
        }

        let mut expired = 0;
        for id in candidates {
            match self.expire_one(&id, now).await {
                Ok(true) => expired += 1,
                Ok(false) => debug!(transaction_id = %id, "Transfer settled before expiry"),
                Err(e) => error!(transaction_id = %id, error = %e, "Failed to expire transfer"),
            }
        }

        if expired > 0 {
            info!(count = expired, "Expired overdue transfers");
        }
        Ok(expired)
    }

    async fn expire_one(
        &self,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let mut uow = self.store.begin().await?;
        let Some(transfer) = uow.lock_transfer(id).await? else {
            return Ok(false);
        };
        // Re-check under the lock: it may have been accepted meanwhile
        if transfer.status != TransferStatus::Pending || !transfer.is_overdue(now) {
            return Ok(false);
        }
        expire_locked(&mut *uow, &transfer, now).await?;
        uow.commit().await?;
        Ok(true)
    }

    // ========================================================================
    // Ledger queries
    // ========================================================================

    /// Full ledger of one owned account, oldest first
    pub async fn account_transactions(
        &self,
        account_number: &AccountNumber,
        caller: UserId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let account = self
            .store
            .get_account(account_number)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_number.clone()))?;
        if !account.is_owned_by(caller) {
            return Err(LedgerError::NotOwner(account_number.clone()));
        }
        self.store.transactions_for_account(account_number).await
    }

    /// Compare the stored balance with the signed sum of the account's ledger
    pub async fn reconcile(
        &self,
        account_number: &AccountNumber,
    ) -> Result<Reconciliation, LedgerError> {
        // Writers hold the account row lock while appending, so the balance
        // and the ledger read under that lock belong to the same commit.
        // The unit is dropped without writing.
        let mut uow = self.store.begin().await?;
        let account = uow
            .lock_account(account_number)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_number.clone()))?;
        let entries = uow.ledger_entries(account_number).await?;
        drop(uow);

        let ledger_sum = entries
            .iter()
            .try_fold(0i64, |sum, e| sum.checked_add(e.signed_amount()))
            .ok_or(LedgerError::Overflow)?;

        let report = Reconciliation {
            account_number: account_number.clone(),
            balance: account.balance,
            ledger_sum,
            entries: entries.len(),
        };
        if !report.is_balanced() {
            error!(
                account = %account_number,
                balance = report.balance,
                ledger_sum = report.ledger_sum,
                "Balance does not match ledger"
            );
        }
        Ok(report)
    }
}

/// Lock an account and check the caller owns it
async fn lock_owned_account(
    uow: &mut dyn UnitOfWork,
    number: &AccountNumber,
    caller: UserId,
) -> Result<Account, LedgerError> {
    let account = uow
        .lock_account(number)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(number.clone()))?;
    if !account.is_owned_by(caller) {
        return Err(LedgerError::NotOwner(number.clone()));
    }
    Ok(account)
}

/// Stage one balance change together with its ledger entry
async fn settle(
    uow: &mut dyn UnitOfWork,
    account: &Account,
    amount: MinorUnits,
    kind: TransactionKind,
    side: EntrySide,
) -> Result<(Account, Transaction), LedgerError> {
    let updated = apply_delta(account, side.apply(amount))?;
    uow.write_balance(&updated).await?;
    let entry = LedgerRecorder::record(uow, &account.account_number, amount, kind, side).await?;
    Ok((updated, entry))
}

async fn expire_locked(
    uow: &mut dyn UnitOfWork,
    transfer: &Transfer,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let expired = transfer.expired(now)?;
    if !uow
        .update_transfer_if(&expired, TransferStatus::Pending)
        .await?
    {
        return Err(LedgerError::PersistenceFailure(format!(
            "transfer {} changed under row lock",
            transfer.transaction_id
        )));
    }
    Ok(())
}

fn log_rejected(op: &str, account: &AccountNumber, amount: MinorUnits, e: &LedgerError) {
    if matches!(e, LedgerError::PersistenceFailure(_)) {
        error!(op, account = %account, amount, error = %e, "Settlement aborted");
    } else {
        warn!(op, account = %account, amount, code = e.code(), "Settlement rejected");
    }
}
