use std::sync::Arc;

use thiserror::Error;

use splitledger_core::{Amount, ExpenseId, GroupId, LedgerError, UserId};
use splitledger_ledger::{
    ContributionRecord, ExpenseDetail, ExpenseLine, Group, NewExpense, NewGroup, OwedRecord,
    SettlementRecord, SettlementScope,
};

/// Owed rows and recorded settlements of one group ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupLedger {
    pub owed: Vec<OwedRecord>,
    pub settlements: Vec<SettlementRecord>,
}

/// Scope a settlement transaction serialises on.
///
/// Two transactions with the same lock never interleave. Personal locks are normalised
/// so `(a, b)` and `(b, a)` contend for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettlementLock {
    Group(GroupId),
    Personal { low: UserId, high: UserId },
}

impl SettlementLock {
    pub fn group(group_id: GroupId) -> Self {
        SettlementLock::Group(group_id)
    }

    pub fn personal(a: UserId, b: UserId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        SettlementLock::Personal { low, high }
    }

    /// Stable textual key, used for database advisory locks.
    pub fn key(&self) -> String {
        match self {
            SettlementLock::Group(id) => format!("group:{id}"),
            SettlementLock::Personal { low, high } => format!("personal:{low}:{high}"),
        }
    }
}

/// Ledger store operation error.
///
/// Infrastructure failures only; domain validation never reaches the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("malformed row: {0}")]
    InvalidRow(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Transaction-level failures (begin, lock, commit) surface as store errors.
impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::store(err.to_string())
    }
}

/// Reads made while aggregating balances surface as aggregation failures.
pub fn read_failure(err: StoreError) -> LedgerError {
    LedgerError::aggregation(err.to_string())
}

/// Reads and writes available inside [`LedgerStore::transaction`].
///
/// Reads observe settlements recorded earlier in the same transaction.
pub trait LedgerTransaction {
    fn fetch_group_ledger(&mut self, group_id: GroupId) -> Result<GroupLedger, StoreError>;

    fn fetch_personal_ledger(
        &mut self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<OwedRecord>, StoreError>;

    fn fetch_personal_settlements(
        &mut self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<SettlementRecord>, StoreError>;

    /// Append a settlement. Visible to other callers only once the transaction commits.
    fn record_settlement(
        &mut self,
        scope: SettlementScope,
        debtor: UserId,
        creditor: UserId,
        amount: Amount,
    ) -> Result<SettlementRecord, StoreError>;
}

/// Persistence boundary of the ledger engine.
///
/// Implementations must:
/// - insert an expense together with all of its rows, or nothing
/// - return personal ledgers restricted to personal-scope expenses shared by both users
/// - return rows in a stable order (expense id, then contributor order)
/// - run [`LedgerStore::transaction`] atomically, serialised per [`SettlementLock`]
/// - list group members ordered by user id
pub trait LedgerStore: Send + Sync {
    fn create_group(&self, group: NewGroup) -> Result<Group, StoreError>;

    /// The group with its members; `None` when it does not exist.
    fn fetch_group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError>;

    /// Add a member to an existing group. Returns `false` when already a member.
    fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError>;

    /// Returns `false` when the user was not a member.
    fn remove_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError>;

    fn insert_expense(
        &self,
        expense: NewExpense,
        lines: &[ExpenseLine],
    ) -> Result<ExpenseDetail, StoreError>;

    /// Contribution rows of one expense; empty when the expense does not exist.
    fn fetch_contributions(&self, expense_id: ExpenseId)
    -> Result<Vec<ContributionRecord>, StoreError>;

    fn fetch_group_ledger(&self, group_id: GroupId) -> Result<GroupLedger, StoreError>;

    fn fetch_personal_ledger(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<OwedRecord>, StoreError>;

    fn fetch_personal_settlements(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<SettlementRecord>, StoreError>;

    /// Group expenses with their rows, ordered by expense id.
    fn fetch_group_expenses(&self, group_id: GroupId) -> Result<Vec<ExpenseDetail>, StoreError>;

    /// Run `f` inside one atomic transaction holding `lock`.
    ///
    /// Writes made through the transaction are committed only when `f` returns `Ok`.
    fn transaction<T, E, F>(&self, lock: SettlementLock, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTransaction) -> Result<T, E>,
        E: From<StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn create_group(&self, group: NewGroup) -> Result<Group, StoreError> {
        (**self).create_group(group)
    }

    fn fetch_group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        (**self).fetch_group(group_id)
    }

    fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError> {
        (**self).add_member(group_id, user_id)
    }

    fn remove_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError> {
        (**self).remove_member(group_id, user_id)
    }

    fn insert_expense(
        &self,
        expense: NewExpense,
        lines: &[ExpenseLine],
    ) -> Result<ExpenseDetail, StoreError> {
        (**self).insert_expense(expense, lines)
    }

    fn fetch_contributions(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ContributionRecord>, StoreError> {
        (**self).fetch_contributions(expense_id)
    }

    fn fetch_group_ledger(&self, group_id: GroupId) -> Result<GroupLedger, StoreError> {
        (**self).fetch_group_ledger(group_id)
    }

    fn fetch_personal_ledger(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<OwedRecord>, StoreError> {
        (**self).fetch_personal_ledger(user_id, counterpart_id)
    }

    fn fetch_personal_settlements(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        (**self).fetch_personal_settlements(user_id, counterpart_id)
    }

    fn fetch_group_expenses(&self, group_id: GroupId) -> Result<Vec<ExpenseDetail>, StoreError> {
        (**self).fetch_group_expenses(group_id)
    }

    fn transaction<T, E, F>(&self, lock: SettlementLock, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).transaction(lock, f)
    }
}
