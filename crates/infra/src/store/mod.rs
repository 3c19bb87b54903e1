//! Ledger store boundary.
//!
//! The engine reaches persistence only through [`LedgerStore`]; the in-memory store
//! backs tests/dev and the Postgres store backs production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{
    read_failure, GroupLedger, LedgerStore, LedgerTransaction, SettlementLock, StoreError,
};
