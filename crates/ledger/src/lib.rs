//! Ledger engine: split calculation, balance aggregation and settlement planning.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. Rows come in as
//! value copies from the store layer and results go back out the same way.

pub mod balance;
pub mod expense;
pub mod group;
pub mod settlement;
pub mod split;

pub use balance::{
    BalanceAggregator, BalanceStatus, BalanceSummary, NetBalances, PairwiseDebt,
};
pub use expense::{
    ContributionRecord, ContributorEntry, Expense, ExpenseDetail, ExpenseLine, ExpenseScope,
    NewExpense, OwedRecord, SplitPolicy,
};
pub use group::{Group, NewGroup};
pub use settlement::{
    Residual, SettlementPlan, SettlementPlanner, SettlementRecord, SettlementScope, Transfer,
};
pub use split::{Split, SplitCalculator};
