//! `splitledger-core` — shared building blocks for the ledger engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): identifiers,
//! the `Amount` value type with its comparison tolerance, and the error taxonomy.

pub mod amount;
pub mod error;
pub mod id;

pub use amount::{Amount, Tolerance};
pub use error::{LedgerError, LedgerResult};
pub use id::{ExpenseId, GroupId, SettlementId, UserId};
