//! Data models for bank accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountNumber, MinorUnits, UserId};

/// Bank account
///
/// `balance` is never negative in any committed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: AccountNumber,
    pub owner_id: UserId,
    pub balance: MinorUnits,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Open a new account with zero balance
    pub fn open(owner_id: UserId) -> Self {
        Self {
            account_number: AccountNumber::generate(),
            owner_id,
            balance: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}
