use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use splitledger_core::{Amount, ExpenseId, GroupId, UserId};
use splitledger_ledger::{
    ContributionRecord, Expense, ExpenseDetail, ExpenseLine, ExpenseScope, Group, NewExpense,
    NewGroup, OwedRecord, SettlementRecord, SettlementScope,
};

use super::r#trait::{GroupLedger, LedgerStore, LedgerTransaction, SettlementLock, StoreError};

#[derive(Debug, Default)]
struct LedgerState {
    last_group_id: i64,
    groups: BTreeMap<GroupId, (String, BTreeSet<UserId>)>,
    last_expense_id: i64,
    expenses: BTreeMap<ExpenseId, (Expense, Vec<ExpenseLine>)>,
    settlements: Vec<SettlementRecord>,
}

impl LedgerState {
    fn group_owed(&self, group_id: GroupId) -> Vec<OwedRecord> {
        self.expenses
            .values()
            .filter(|(e, _)| e.scope == ExpenseScope::Group && e.group_id == Some(group_id))
            .flat_map(|(e, lines)| lines.iter().map(|l| l.owed_record(e.id)))
            .collect()
    }

    fn personal_owed(&self, user_id: UserId, counterpart_id: UserId) -> Vec<OwedRecord> {
        let involves = |lines: &[ExpenseLine], u: UserId| lines.iter().any(|l| l.user_id == u);
        self.expenses
            .values()
            .filter(|(e, lines)| {
                e.scope == ExpenseScope::Personal
                    && involves(lines, user_id)
                    && involves(lines, counterpart_id)
            })
            .flat_map(|(e, lines)| {
                lines
                    .iter()
                    .filter(|l| l.user_id == user_id || l.user_id == counterpart_id)
                    .map(|l| l.owed_record(e.id))
            })
            .collect()
    }
}

fn group_settlements<'a>(
    settlements: impl Iterator<Item = &'a SettlementRecord>,
    group_id: GroupId,
) -> Vec<SettlementRecord> {
    settlements
        .filter(|s| s.scope == SettlementScope::Group(group_id))
        .cloned()
        .collect()
}

fn personal_settlements<'a>(
    settlements: impl Iterator<Item = &'a SettlementRecord>,
    user_id: UserId,
    counterpart_id: UserId,
) -> Vec<SettlementRecord> {
    settlements
        .filter(|s| {
            s.scope == SettlementScope::Personal
                && ((s.debtor == user_id && s.creditor == counterpart_id)
                    || (s.debtor == counterpart_id && s.creditor == user_id))
        })
        .cloned()
        .collect()
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Transactions hold the store's write lock for their whole
/// duration, which serialises every settlement regardless of its lock scope.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of settlement records committed so far.
    pub fn settlement_count(&self) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.settlements.len())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn create_group(&self, group: NewGroup) -> Result<Group, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        state.last_group_id += 1;
        let id = GroupId::new(state.last_group_id);
        state.groups.insert(id, (group.name.clone(), BTreeSet::new()));

        Ok(Group {
            id,
            name: group.name,
            members: Vec::new(),
        })
    }

    fn fetch_group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.groups.get(&group_id).map(|(name, members)| Group {
            id: group_id,
            name: name.clone(),
            members: members.iter().copied().collect(),
        }))
    }

    fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let (_, members) = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::Query(format!("group {group_id} does not exist")))?;
        Ok(members.insert(user_id))
    }

    fn remove_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        Ok(state
            .groups
            .get_mut(&group_id)
            .is_some_and(|(_, members)| members.remove(&user_id)))
    }

    fn insert_expense(
        &self,
        expense: NewExpense,
        lines: &[ExpenseLine],
    ) -> Result<ExpenseDetail, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        state.last_expense_id += 1;
        let expense = expense.into_expense(ExpenseId::new(state.last_expense_id));
        let detail = ExpenseDetail::from_lines(expense.clone(), lines);
        state
            .expenses
            .insert(expense.id, (expense, lines.to_vec()));

        Ok(detail)
    }

    fn fetch_contributions(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ContributionRecord>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .expenses
            .get(&expense_id)
            .map(|(_, lines)| lines.iter().map(|l| l.contribution_record(expense_id)).collect())
            .unwrap_or_default())
    }

    fn fetch_group_ledger(&self, group_id: GroupId) -> Result<GroupLedger, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(GroupLedger {
            owed: state.group_owed(group_id),
            settlements: group_settlements(state.settlements.iter(), group_id),
        })
    }

    fn fetch_personal_ledger(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<OwedRecord>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.personal_owed(user_id, counterpart_id))
    }

    fn fetch_personal_settlements(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(personal_settlements(
            state.settlements.iter(),
            user_id,
            counterpart_id,
        ))
    }

    fn fetch_group_expenses(&self, group_id: GroupId) -> Result<Vec<ExpenseDetail>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .expenses
            .values()
            .filter(|(e, _)| e.group_id == Some(group_id))
            .map(|(e, lines)| ExpenseDetail::from_lines(e.clone(), lines))
            .collect())
    }

    fn transaction<T, E, F>(&self, lock: SettlementLock, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        tracing::trace!(lock = %lock.key(), "in-memory transaction started");

        let mut tx = InMemoryTransaction {
            state: &state,
            staged: Vec::new(),
        };
        let value = f(&mut tx)?;

        let staged = tx.staged;
        state.settlements.extend(staged);
        Ok(value)
    }
}

/// Read view over the locked state plus settlements staged by the running transaction.
struct InMemoryTransaction<'a> {
    state: &'a LedgerState,
    staged: Vec<SettlementRecord>,
}

impl InMemoryTransaction<'_> {
    fn all_settlements(&self) -> impl Iterator<Item = &SettlementRecord> {
        self.state.settlements.iter().chain(self.staged.iter())
    }
}

impl LedgerTransaction for InMemoryTransaction<'_> {
    fn fetch_group_ledger(&mut self, group_id: GroupId) -> Result<GroupLedger, StoreError> {
        Ok(GroupLedger {
            owed: self.state.group_owed(group_id),
            settlements: group_settlements(self.all_settlements(), group_id),
        })
    }

    fn fetch_personal_ledger(
        &mut self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<OwedRecord>, StoreError> {
        Ok(self.state.personal_owed(user_id, counterpart_id))
    }

    fn fetch_personal_settlements(
        &mut self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        Ok(personal_settlements(
            self.all_settlements(),
            user_id,
            counterpart_id,
        ))
    }

    fn record_settlement(
        &mut self,
        scope: SettlementScope,
        debtor: UserId,
        creditor: UserId,
        amount: Amount,
    ) -> Result<SettlementRecord, StoreError> {
        let record = SettlementRecord::new(scope, debtor, creditor, amount);
        self.staged.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitledger_ledger::SplitPolicy;

    fn user(id: i64) -> UserId {
        UserId::new(id)
    }

    fn line(u: i64, paid: f64, contribution: f64) -> ExpenseLine {
        ExpenseLine {
            user_id: user(u),
            paid_amount: Amount::new(paid),
            contribution_amount: Amount::new(contribution),
        }
    }

    fn new_expense(group_id: Option<GroupId>) -> NewExpense {
        NewExpense {
            description: "groceries".to_string(),
            amount: Amount::new(60.0),
            policy: SplitPolicy::Equal,
            created_by: user(1),
            group_id,
        }
    }

    #[test]
    fn expense_ids_are_assigned_in_order() {
        let store = InMemoryLedgerStore::new();
        let lines = [line(1, 60.0, 30.0), line(2, 0.0, 30.0)];

        let first = store.insert_expense(new_expense(None), &lines).unwrap();
        let second = store.insert_expense(new_expense(None), &lines).unwrap();

        assert_eq!(first.expense.id, ExpenseId::new(1));
        assert_eq!(second.expense.id, ExpenseId::new(2));
        assert_eq!(store.fetch_contributions(first.expense.id).unwrap().len(), 2);
        assert!(store.fetch_contributions(ExpenseId::new(99)).unwrap().is_empty());
    }

    #[test]
    fn personal_ledger_only_covers_shared_personal_expenses() {
        let store = InMemoryLedgerStore::new();
        store
            .insert_expense(new_expense(None), &[line(1, 60.0, 30.0), line(2, 0.0, 30.0)])
            .unwrap();
        // personal, but user 2 is not part of it
        store
            .insert_expense(new_expense(None), &[line(1, 60.0, 30.0), line(3, 0.0, 30.0)])
            .unwrap();
        // shared, but group scoped
        store
            .insert_expense(
                new_expense(Some(GroupId::new(1))),
                &[line(1, 60.0, 30.0), line(2, 0.0, 30.0)],
            )
            .unwrap();

        let rows = store.fetch_personal_ledger(user(1), user(2)).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.expense_id == ExpenseId::new(1)));
    }

    #[test]
    fn group_membership_round_trip() {
        let store = InMemoryLedgerStore::new();
        let group = store
            .create_group(NewGroup {
                name: "flat".to_string(),
            })
            .unwrap();
        assert_eq!(group.id, GroupId::new(1));

        assert!(store.add_member(group.id, user(7)).unwrap());
        assert!(store.add_member(group.id, user(3)).unwrap());
        assert!(!store.add_member(group.id, user(3)).unwrap());

        let fetched = store.fetch_group(group.id).unwrap().unwrap();
        assert_eq!(fetched.members, vec![user(3), user(7)]);

        assert!(store.remove_member(group.id, user(7)).unwrap());
        assert!(!store.remove_member(group.id, user(7)).unwrap());
        assert!(!store.remove_member(GroupId::new(99), user(3)).unwrap());
        assert!(store.add_member(GroupId::new(99), user(3)).is_err());
        assert!(store.fetch_group(GroupId::new(99)).unwrap().is_none());
    }

    #[test]
    fn failed_transaction_discards_staged_settlements() {
        let store = InMemoryLedgerStore::new();

        let group = GroupId::new(1);
        let result: Result<(), StoreError> =
            store.transaction(SettlementLock::group(group), |tx| {
                tx.record_settlement(
                    SettlementScope::Group(group),
                    user(1),
                    user(2),
                    Amount::new(5.0),
                )?;
                Err(StoreError::Transaction("boom".to_string()))
            });

        assert!(result.is_err());
        assert_eq!(store.settlement_count().unwrap(), 0);
    }

    #[test]
    fn transaction_reads_its_own_writes() {
        let store = InMemoryLedgerStore::new();
        let group = GroupId::new(2);

        let seen = store
            .transaction(SettlementLock::group(group), |tx| {
                tx.record_settlement(
                    SettlementScope::Group(group),
                    user(1),
                    user(2),
                    Amount::new(5.0),
                )?;
                Ok::<_, StoreError>(tx.fetch_group_ledger(group)?.settlements.len())
            })
            .unwrap();

        assert_eq!(seen, 1);
        assert_eq!(store.fetch_group_ledger(group).unwrap().settlements.len(), 1);
        assert!(store.fetch_group_ledger(GroupId::new(3)).unwrap().settlements.is_empty());
    }
}
