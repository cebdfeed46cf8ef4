//! Transfer FSM State Definitions
//!
//! State IDs are stored in PostgreSQL as SMALLINT.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transfer FSM States
///
/// ```text
/// PENDING ──accept──▶ ACCEPTED
///    │
///    └──deadline──▶ EXPIRED
/// ```
///
/// Terminal states: ACCEPTED (10), EXPIRED (-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransferStatus {
    /// Sender already debited - funds are IN-FLIGHT until accept
    Pending = 0,

    /// Terminal: receiver credited
    Accepted = 10,

    /// Terminal: deadline passed before acceptance
    Expired = -10,
}

impl TransferStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Accepted | TransferStatus::Expired)
    }

    /// Only PENDING → ACCEPTED and PENDING → EXPIRED exist
    #[inline]
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (
                TransferStatus::Pending,
                TransferStatus::Accepted | TransferStatus::Expired
            )
        )
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::Pending),
            10 => Some(TransferStatus::Accepted),
            -10 => Some(TransferStatus::Expired),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Accepted => "ACCEPTED",
            TransferStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}
