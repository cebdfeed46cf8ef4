//! Transfer Core Types

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::state::TransferStatus;
use crate::core_types::{AccountNumber, MinorUnits, TransactionId, UserId};
use crate::error::LedgerError;

/// Default time a transfer stays acceptable: 30 * 3600 seconds
pub const DEFAULT_TRANSFER_TTL_SECS: u64 = 30 * 3600;

/// Which side of a transfer a listing is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    Sender,
    Receiver,
}

/// Transfer record
///
/// Keyed by the id of the sender's debit ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub transaction_id: TransactionId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub sender_account: AccountNumber,
    pub amount: MinorUnits,
    pub status: TransferStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Account credited on accept
    pub accepted_account: Option<AccountNumber>,
    /// Receiver's credit ledger entry
    pub accepted_transaction_id: Option<TransactionId>,
    /// When the transfer reached a terminal state
    pub settled_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Create a new transfer in PENDING state
    pub fn new(
        transaction_id: TransactionId,
        sender_id: UserId,
        receiver_id: UserId,
        sender_account: AccountNumber,
        amount: MinorUnits,
        created_at: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Self {
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let expires_at = created_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            transaction_id,
            sender_id,
            receiver_id,
            sender_account,
            amount,
            status: TransferStatus::Pending,
            expires_at,
            created_at,
            accepted_account: None,
            accepted_transaction_id: None,
            settled_at: None,
        }
    }

    /// Deadline reached - no longer acceptable
    #[inline]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// PENDING → ACCEPTED
    pub fn accepted(
        &self,
        into: AccountNumber,
        credit_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<Transfer, LedgerError> {
        self.ensure_transition(TransferStatus::Accepted)?;
        Ok(Transfer {
            status: TransferStatus::Accepted,
            accepted_account: Some(into),
            accepted_transaction_id: Some(credit_id),
            settled_at: Some(now),
            ..self.clone()
        })
    }

    /// PENDING → EXPIRED
    pub fn expired(&self, now: DateTime<Utc>) -> Result<Transfer, LedgerError> {
        self.ensure_transition(TransferStatus::Expired)?;
        Ok(Transfer {
            status: TransferStatus::Expired,
            settled_at: Some(now),
            ..self.clone()
        })
    }

    fn ensure_transition(&self, next: TransferStatus) -> Result<(), LedgerError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(LedgerError::TransferNotPending {
                id: self.transaction_id,
                status: self.status,
            })
        }
    }
}
