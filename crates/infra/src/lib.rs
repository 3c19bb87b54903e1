//! Infrastructure layer: ledger stores, application service, config.

pub mod config;
pub mod ledger_service;
pub mod store;


pub use config::{ConfigError, DatabaseConfig, LedgerConfig};
pub use ledger_service::{LedgerService, PersonalBalance, SettleOutcome, UserGroupBalance};
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
