// Persistence module: repository traits with PostgreSQL and in-memory backends
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod schema;

pub use memory::{Fault, MemoryStore};
pub use postgres::PgLedgerStore;
pub use repository::{LedgerStore, UnitOfWork};
