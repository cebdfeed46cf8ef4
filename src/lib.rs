//! Settlement Ledger - Account Ledger & Transfer Settlement Engine
//!
//! Bank accounts with an append-only ledger. Every balance change commits
//! atomically with exactly one ledger entry.
//!
//! # Modules
//!
//! - [`core_types`] - Account numbers, transaction ids, minor units
//! - [`money`] - Decimal string parsing and formatting
//! - [`account`] - Account model and the balance mutator
//! - [`ledger`] - Ledger entries and the recorder
//! - [`transfer`] - PENDING/ACCEPTED/EXPIRED state machine and expiry sweeper
//! - [`settlement`] - Coordinator running each operation as one unit of work
//! - [`feed`] - Recent activity across a user's accounts
//! - [`persistence`] - Store traits with PostgreSQL and in-memory backends

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod persistence;
pub mod settlement;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::Account;
pub use core_types::{AccountNumber, MinorUnits, TransactionId, UserId};
pub use error::LedgerError;
pub use feed::ActivityFeed;
pub use ledger::{EntrySide, Transaction, TransactionKind};
pub use persistence::{LedgerStore, MemoryStore, PgLedgerStore, UnitOfWork};
pub use settlement::{Reconciliation, SentTransfer, SettlementCoordinator};
pub use transfer::{ExpirySweeper, Transfer, TransferStatus};
