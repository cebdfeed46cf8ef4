//! Settlement
//!
//! Atomic balance changes with their ledger entries, and the
//! send/accept transfer flow built on top of them.
//!
//! # Transfer lifecycle
//!
//! ```text
//! send:   debit sender ─▶ PENDING
//! accept: PENDING ─▶ credit receiver ─▶ ACCEPTED
//! expiry: PENDING ─▶ EXPIRED (sender stays debited)
//! ```

pub mod coordinator;

pub use coordinator::{Reconciliation, SentTransfer, SettlementCoordinator};
