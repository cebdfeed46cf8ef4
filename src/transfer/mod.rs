//! Transfer state machine
//!
//! ```text
//! PENDING ──accept──▶ ACCEPTED
//!    │
//!    └──deadline──▶ EXPIRED
//! ```
//!
//! Both terminal states are final. A transfer is keyed by the id of the
//! sender's debit ledger entry.

pub mod state;
pub mod types;
pub mod worker;

pub use state::TransferStatus;
pub use types::{DEFAULT_TRANSFER_TTL_SECS, Transfer, TransferRole};
pub use worker::ExpirySweeper;
