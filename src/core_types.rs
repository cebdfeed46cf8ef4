//! Core types used throughout the system
//!
//! Identifiers and amount aliases shared by the store, the settlement
//! coordinator and the feed.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// User ID - stable identifier handed over by the authentication layer.
///
/// Stored as BIGINT in PostgreSQL.
pub type UserId = u64;

/// Monetary amount in integer minor units (cents).
///
/// Balances are never fractional; conversion from client strings happens in
/// [`crate::money`].
pub type MinorUnits = i64;

/// Account number in `dddd-dddd-dddd-dddd` form.
///
/// Immutable once assigned to an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber(String);

const ACCOUNT_NUMBER_DIGITS: usize = 16;
const ACCOUNT_NUMBER_GROUP: usize = 4;

impl AccountNumber {
    /// Generate a random account number
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut number = String::with_capacity(ACCOUNT_NUMBER_DIGITS + 3);
        for i in 0..ACCOUNT_NUMBER_DIGITS {
            if i > 0 && i % ACCOUNT_NUMBER_GROUP == 0 {
                number.push('-');
            }
            let digit: u8 = rng.gen_range(0..10);
            number.push(char::from(b'0' + digit));
        }
        Self(number)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Account number parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid account number: {0}")]
pub struct InvalidAccountNumber(pub String);

impl FromStr for AccountNumber {
    type Err = InvalidAccountNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.split('-').collect();
        let well_formed = groups.len() == ACCOUNT_NUMBER_DIGITS / ACCOUNT_NUMBER_GROUP
            && groups
                .iter()
                .all(|g| g.len() == ACCOUNT_NUMBER_GROUP && g.bytes().all(|b| b.is_ascii_digit()));

        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidAccountNumber(s.to_string()))
        }
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = InvalidAccountNumber;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountNumber> for String {
    fn from(value: AccountNumber) -> Self {
        value.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction ID - random UUIDv4 assigned to every ledger entry.
///
/// A transfer is keyed by the id of its send-side ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(uuid::Uuid);

impl TransactionId {
    /// Generate a new unique TransactionId
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Get the inner UUID value
    pub fn inner(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}
