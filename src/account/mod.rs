//! Account management module
//!
//! Account rows and the balance mutator. Persistence lives behind
//! [`crate::persistence::LedgerStore`].

pub mod balance;
pub mod models;

// Re-export commonly used types
pub use balance::apply_delta;
pub use models::Account;
