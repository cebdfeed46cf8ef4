//! PostgreSQL ledger store
//!
//! Each [`UnitOfWork`] is one database transaction. Locked reads use
//! `SELECT ... FOR UPDATE`, so same-row units serialize while units on
//! different rows run in parallel. Dropping the transaction rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};

use super::repository::{LedgerStore, UnitOfWork};
use crate::account::Account;
use crate::core_types::{AccountNumber, TransactionId, UserId};
use crate::error::LedgerError;
use crate::ledger::{EntrySide, Transaction, TransactionKind};
use crate::transfer::{Transfer, TransferRole, TransferStatus};

const ACCOUNT_COLUMNS: &str = "account_number, owner_id, balance, created_at";

const TRANSACTION_COLUMNS: &str =
    "transaction_id, account_number, amount, kind, side, created_at";

const TRANSFER_COLUMNS: &str = "transaction_id, sender_id, receiver_id, sender_account, amount, \
     status, expires_at, accepted_account, accepted_transaction_id, settled_at, created_at";

/// PostgreSQL-backed [`LedgerStore`]
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn insert_account(&self, account: &Account) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (account_number, owner_id, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (account_number) DO NOTHING
            "#,
        )
        .bind(account.account_number.as_str())
        .bind(account.owner_id as i64)
        .bind(account.balance)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_account(&self, number: &AccountNumber) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn accounts_by_owner(&self, owner: UserId) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = $1 \
             ORDER BY created_at ASC, account_number ASC"
        ))
        .bind(owner as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn recent_transactions(
        &self,
        accounts: &[AccountNumber],
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let numbers: Vec<String> = accounts.iter().map(|a| a.as_str().to_string()).collect();

        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions \
             WHERE account_number = ANY($1) \
             ORDER BY created_at DESC, seq DESC \
             LIMIT $2"
        ))
        .bind(numbers)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn transactions_for_account(
        &self,
        account: &AccountNumber,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions \
             WHERE account_number = $1 ORDER BY seq ASC"
        ))
        .bind(account.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn get_transfer(&self, id: &TransactionId) -> Result<Option<Transfer>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE transaction_id = $1"
        ))
        .bind(id.inner())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_transfer).transpose()
    }

    async fn transfers_for_user(
        &self,
        user: UserId,
        role: TransferRole,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let column = match role {
            TransferRole::Sender => "sender_id",
            TransferRole::Receiver => "receiver_id",
        };

        let rows = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE {column} = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(user as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transfer).collect()
    }

    async fn find_overdue_transfers(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TransactionId>, LedgerError> {
        let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r#"
            SELECT transaction_id FROM transfers
            WHERE status = $1 AND expires_at <= $2
            ORDER BY expires_at ASC
            LIMIT $3
            "#,
        )
        .bind(TransferStatus::Pending.id())
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(TransactionId::from_uuid).collect())
    }
}

/// One PostgreSQL transaction
pub struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_account(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1 FOR UPDATE"
        ))
        .bind(number.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn write_balance(&mut self, account: &Account) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE accounts SET balance = $1, updated_at = NOW() WHERE account_number = $2",
        )
        .bind(account.balance)
        .bind(account.account_number.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(LedgerError::PersistenceFailure(format!(
                "balance update touched {} rows for {}",
                result.rows_affected(),
                account.account_number
            )));
        }
        Ok(())
    }

    async fn ledger_entries(
        &mut self,
        account: &AccountNumber,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions \
             WHERE account_number = $1 ORDER BY seq ASC"
        ))
        .bind(account.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn append_transaction(&mut self, entry: &Transaction) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_transactions
                (transaction_id, account_number, amount, kind, side, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.transaction_id.inner())
        .bind(entry.account_number.as_str())
        .bind(entry.amount)
        .bind(entry.kind.id())
        .bind(entry.side.id())
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO transfers
                (transaction_id, sender_id, receiver_id, sender_account, amount,
                 status, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transfer.transaction_id.inner())
        .bind(transfer.sender_id as i64)
        .bind(transfer.receiver_id as i64)
        .bind(transfer.sender_account.as_str())
        .bind(transfer.amount)
        .bind(transfer.status.id())
        .bind(transfer.expires_at)
        .bind(transfer.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn lock_transfer(
        &mut self,
        id: &TransactionId,
    ) -> Result<Option<Transfer>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE transaction_id = $1 FOR UPDATE"
        ))
        .bind(id.inner())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_transfer).transpose()
    }

    async fn update_transfer_if(
        &mut self,
        transfer: &Transfer,
        expected: TransferStatus,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = $1, accepted_account = $2, accepted_transaction_id = $3, settled_at = $4
            WHERE transaction_id = $5 AND status = $6
            "#,
        )
        .bind(transfer.status.id())
        .bind(transfer.accepted_account.as_ref().map(|a| a.as_str().to_string()))
        .bind(transfer.accepted_transaction_id.map(|id| id.inner()))
        .bind(transfer.settled_at)
        .bind(transfer.transaction_id.inner())
        .bind(expected.id())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn parse_account_number(raw: String) -> Result<AccountNumber, LedgerError> {
    raw.parse()
        .map_err(|e: crate::core_types::InvalidAccountNumber| {
            LedgerError::PersistenceFailure(e.to_string())
        })
}

fn row_to_account(row: &PgRow) -> Result<Account, LedgerError> {
    Ok(Account {
        account_number: parse_account_number(row.try_get("account_number")?)?,
        owner_id: row.try_get::<i64, _>("owner_id")? as UserId,
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction, LedgerError> {
    let kind_id: i16 = row.try_get("kind")?;
    let kind = TransactionKind::from_id(kind_id).ok_or_else(|| {
        LedgerError::PersistenceFailure(format!("Invalid transaction kind: {}", kind_id))
    })?;

    let side_id: i16 = row.try_get("side")?;
    let side = EntrySide::from_id(side_id).ok_or_else(|| {
        LedgerError::PersistenceFailure(format!("Invalid entry side: {}", side_id))
    })?;

    Ok(Transaction {
        transaction_id: TransactionId::from_uuid(row.try_get("transaction_id")?),
        account_number: parse_account_number(row.try_get("account_number")?)?,
        amount: row.try_get("amount")?,
        kind,
        side,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_transfer(row: &PgRow) -> Result<Transfer, LedgerError> {
    let status_id: i16 = row.try_get("status")?;
    let status = TransferStatus::from_id(status_id).ok_or_else(|| {
        LedgerError::PersistenceFailure(format!("Invalid transfer status: {}", status_id))
    })?;

    let accepted_account: Option<String> = row.try_get("accepted_account")?;
    let accepted_transaction_id: Option<uuid::Uuid> = row.try_get("accepted_transaction_id")?;

    Ok(Transfer {
        transaction_id: TransactionId::from_uuid(row.try_get("transaction_id")?),
        sender_id: row.try_get::<i64, _>("sender_id")? as UserId,
        receiver_id: row.try_get::<i64, _>("receiver_id")? as UserId,
        sender_account: parse_account_number(row.try_get("sender_account")?)?,
        amount: row.try_get("amount")?,
        status,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        accepted_account: accepted_account.map(parse_account_number).transpose()?,
        accepted_transaction_id: accepted_transaction_id.map(TransactionId::from_uuid),
        settled_at: row.try_get("settled_at")?,
    })
}
