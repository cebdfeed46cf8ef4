//! Ledger Recorder
//!
//! Builds ledger entries and appends them through a unit of work.

use chrono::Utc;

use super::models::{EntrySide, Transaction, TransactionKind};
use crate::core_types::{AccountNumber, MinorUnits, TransactionId};
use crate::error::LedgerError;
use crate::persistence::UnitOfWork;

pub struct LedgerRecorder;

impl LedgerRecorder {
    /// Append one entry with a freshly generated transaction id
    ///
    /// Any store failure is returned as-is; the caller must abandon its unit
    /// of work.
    pub async fn record(
        uow: &mut dyn UnitOfWork,
        account_number: &AccountNumber,
        amount: MinorUnits,
        kind: TransactionKind,
        side: EntrySide,
    ) -> Result<Transaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let entry = Transaction {
            transaction_id: TransactionId::new(),
            account_number: account_number.clone(),
            amount,
            kind,
            side,
            created_at: Utc::now(),
        };

        uow.append_transaction(&entry).await?;
        tracing::debug!(
            transaction_id = %entry.transaction_id,
            account = %entry.account_number,
            amount,
            kind = %kind,
            side = %side,
            "Ledger entry staged"
        );

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::persistence::{Fault, LedgerStore, MemoryStore};

    #[tokio::test]
    async fn test_record_generates_unique_ids() {
        let store = MemoryStore::new();
        let account = Account::open(1);
        store.insert_account(&account).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let a = LedgerRecorder::record(
            &mut *uow,
            &account.account_number,
            100,
            TransactionKind::Deposit,
            EntrySide::Credit,
        )
        .await
        .unwrap();
        let b = LedgerRecorder::record(
            &mut *uow,
            &account.account_number,
            100,
            TransactionKind::Deposit,
            EntrySide::Credit,
        )
        .await
        .unwrap();
        uow.commit().await.unwrap();

        assert_ne!(a.transaction_id, b.transaction_id);
        assert_eq!(store.transaction_count(), 2);
    }

    #[tokio::test]
    async fn test_record_rejects_non_positive_amount() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let result = LedgerRecorder::record(
            &mut *uow,
            &AccountNumber::generate(),
            0,
            TransactionKind::Withdraw,
            EntrySide::Debit,
        )
        .await;
        assert_eq!(result, Err(LedgerError::InvalidAmount));
    }

    #[tokio::test]
    async fn test_record_propagates_store_failure() {
        let store = MemoryStore::new();
        store.fail_next(Fault::TransactionAppend);

        let mut uow = store.begin().await.unwrap();
        let result = LedgerRecorder::record(
            &mut *uow,
            &AccountNumber::generate(),
            10,
            TransactionKind::Deposit,
            EntrySide::Credit,
        )
        .await;
        assert!(matches!(result, Err(LedgerError::PersistenceFailure(_))));
    }
}
