//! Ledger - append-only transaction log
//!
//! Every committed balance change is recorded as exactly one
//! [`Transaction`]. Entries are never updated or deleted.

pub mod models;
pub mod recorder;

pub use models::{EntrySide, Transaction, TransactionKind};
pub use recorder::LedgerRecorder;
