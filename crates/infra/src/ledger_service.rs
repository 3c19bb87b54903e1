//! Ledger orchestration (application-level).
//!
//! `LedgerService` wires the pure calculators to an injected [`LedgerStore`]:
//!
//! ```text
//! groups:        NewGroup → Store.create_group / add_member / remove_member
//! add expense:   contributors → SplitCalculator → Store.insert_expense
//! balance query: Store.fetch_* → BalanceAggregator → (SettlementPlanner)
//! settle:        Store.transaction { re-read ledger → aggregate → record settlement }
//! ```
//!
//! ## Error mapping
//!
//! - Split validation failures are returned unchanged.
//! - Store failures while reading ledger rows → `LedgerError::AggregationFailure`.
//! - Store failures while writing (expense insert, settlement transaction) →
//!   `LedgerError::Store`.
//!
//! Nothing is retried here. "Nothing to settle" is [`SettleOutcome::NothingToSettle`],
//! not an error.

use serde::{Deserialize, Serialize};
use tracing::{instrument, Span};

use splitledger_core::{Amount, ExpenseId, GroupId, LedgerError, LedgerResult, UserId};
use splitledger_ledger::{
    BalanceAggregator, BalanceSummary, ContributionRecord, ContributorEntry, ExpenseDetail, Group,
    NetBalances, NewExpense, NewGroup, PairwiseDebt, SettlementPlan, SettlementPlanner,
    SettlementRecord, SettlementScope, SplitCalculator, Transfer,
};

use crate::store::{read_failure, LedgerStore, LedgerTransaction, SettlementLock};

/// A user's position inside a group, plus the planned transfers that involve them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserGroupBalance {
    pub group_id: GroupId,
    pub summary: BalanceSummary,
    pub transfers: Vec<Transfer>,
}

/// Personal balance between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalBalance {
    pub user_id: UserId,
    pub counterpart_id: UserId,
    /// Raw per-expense debts, not netted.
    pub debts: Vec<PairwiseDebt>,
    /// Net position of both users after recorded settlements.
    pub net: NetBalances,
    pub plan: SettlementPlan,
}

/// Result of a settle request.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    Settled(SettlementRecord),
    NothingToSettle,
}

/// Application service over a ledger store.
#[derive(Debug, Clone)]
pub struct LedgerService<S> {
    store: S,
    splits: SplitCalculator,
    balances: BalanceAggregator,
    planner: SettlementPlanner,
}

impl<S> LedgerService<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            splits: SplitCalculator,
            balances: BalanceAggregator,
            planner: SettlementPlanner,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self, group), fields(group_id = tracing::field::Empty), err)]
    pub fn create_group(&self, group: NewGroup) -> LedgerResult<Group> {
        let group = self.store.create_group(group.validated()?)?;
        Span::current().record("group_id", group.id.get());
        tracing::info!(name = %group.name, "group created");
        Ok(group)
    }

    #[instrument(skip(self), fields(group_id = %group_id), err)]
    pub fn group(&self, group_id: GroupId) -> LedgerResult<Group> {
        self.store
            .fetch_group(group_id)
            .map_err(read_failure)?
            .ok_or(LedgerError::GroupNotFound(group_id))
    }

    /// Add `user_id` to the group. Adding an existing member is a no-op.
    #[instrument(skip(self), fields(group_id = %group_id, user_id = %user_id), err)]
    pub fn add_member(&self, group_id: GroupId, user_id: UserId) -> LedgerResult<Group> {
        self.group(group_id)?;
        if !self.store.add_member(group_id, user_id)? {
            tracing::debug!("user already a member");
        }
        self.group(group_id)
    }

    #[instrument(skip(self), fields(group_id = %group_id, user_id = %user_id), err)]
    pub fn remove_member(&self, group_id: GroupId, user_id: UserId) -> LedgerResult<Group> {
        if !self.store.remove_member(group_id, user_id)? {
            return Err(LedgerError::MemberNotFound { group_id, user_id });
        }
        self.group(group_id)
    }

    /// Split `expense` among `contributors` and persist it with all of its rows.
    #[instrument(
        skip(self, expense, contributors),
        fields(
            policy = %expense.policy,
            group_id = ?expense.group_id,
            contributors = contributors.len(),
            expense_id = tracing::field::Empty
        ),
        err
    )]
    pub fn add_expense(
        &self,
        expense: NewExpense,
        contributors: &[ContributorEntry],
    ) -> LedgerResult<ExpenseDetail> {
        let lines = self
            .splits
            .lines(expense.amount, expense.policy, contributors)
            .inspect_err(|e| tracing::warn!(error = %e, "split rejected"))?;

        let detail = self.store.insert_expense(expense, &lines)?;
        Span::current().record("expense_id", detail.expense.id.get());
        Ok(detail)
    }

    #[instrument(skip(self), fields(expense_id = %expense_id), err)]
    pub fn expense_contributions(
        &self,
        expense_id: ExpenseId,
    ) -> LedgerResult<Vec<ContributionRecord>> {
        self.store
            .fetch_contributions(expense_id)
            .map_err(read_failure)
    }

    #[instrument(skip(self), fields(group_id = %group_id), err)]
    pub fn group_expenses(&self, group_id: GroupId) -> LedgerResult<Vec<ExpenseDetail>> {
        self.store
            .fetch_group_expenses(group_id)
            .map_err(read_failure)
    }

    #[instrument(skip(self), fields(group_id = %group_id), err)]
    pub fn group_net_balances(&self, group_id: GroupId) -> LedgerResult<NetBalances> {
        let ledger = self
            .store
            .fetch_group_ledger(group_id)
            .map_err(read_failure)?;
        self.balances
            .group_net(group_id, &ledger.owed, &ledger.settlements)
    }

    /// Transfers that settle every balance in the group.
    #[instrument(skip(self), fields(group_id = %group_id, transfers = tracing::field::Empty), err)]
    pub fn group_settlement_plan(&self, group_id: GroupId) -> LedgerResult<SettlementPlan> {
        let net = self.group_net_balances(group_id)?;
        let plan = self.planner.plan(&net)?;
        Span::current().record("transfers", plan.len());
        Ok(plan)
    }

    #[instrument(skip(self), fields(group_id = %group_id, user_id = %user_id), err)]
    pub fn user_group_balance(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> LedgerResult<UserGroupBalance> {
        let net = self.group_net_balances(group_id)?;
        let plan = self.planner.plan(&net)?;
        Ok(UserGroupBalance {
            group_id,
            summary: self.balances.user_summary(&net, user_id),
            transfers: plan.involving(user_id),
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, counterpart_id = %counterpart_id), err)]
    pub fn personal_balance(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> LedgerResult<PersonalBalance> {
        let owed = self
            .store
            .fetch_personal_ledger(user_id, counterpart_id)
            .map_err(read_failure)?;
        let settlements = self
            .store
            .fetch_personal_settlements(user_id, counterpart_id)
            .map_err(read_failure)?;

        let debts = self
            .balances
            .personal_pairwise(user_id, counterpart_id, &owed);
        let net = self
            .balances
            .personal_net(user_id, counterpart_id, &owed, &settlements);
        let plan = self.planner.plan(&net)?;

        Ok(PersonalBalance {
            user_id,
            counterpart_id,
            debts,
            net,
            plan,
        })
    }

    /// Settle everything `payer` owes `payee` on personal expenses.
    ///
    /// Records `payer → payee` for the payer's outstanding debt when the payer's personal
    /// net balance against the payee is negative beyond tolerance.
    #[instrument(skip(self), fields(payer = %payer, payee = %payee), err)]
    pub fn settle_personal(&self, payer: UserId, payee: UserId) -> LedgerResult<SettleOutcome> {
        if payer == payee {
            return Ok(SettleOutcome::NothingToSettle);
        }

        self.store
            .transaction(SettlementLock::personal(payer, payee), |tx| {
                let owed = tx
                    .fetch_personal_ledger(payer, payee)
                    .map_err(read_failure)?;
                let settlements = tx
                    .fetch_personal_settlements(payer, payee)
                    .map_err(read_failure)?;

                let net = self.balances.personal_net(payer, payee, &owed, &settlements);
                let owes = net.get(payer);
                if !owes.is_negative() || net.tolerance().is_zero(owes) {
                    return Ok(SettleOutcome::NothingToSettle);
                }

                record(tx, SettlementScope::Personal, payer, payee, -owes)
            })
            .inspect(log_outcome)
    }

    /// Settle between two group members: when `user1` owes and `user2` is owed, records
    /// `user1 → user2` for the smaller of the two amounts.
    #[instrument(skip(self), fields(group_id = %group_id, user1 = %user1, user2 = %user2), err)]
    pub fn settle_group_pair(
        &self,
        group_id: GroupId,
        user1: UserId,
        user2: UserId,
    ) -> LedgerResult<SettleOutcome> {
        if user1 == user2 {
            return Ok(SettleOutcome::NothingToSettle);
        }

        self.store
            .transaction(SettlementLock::group(group_id), |tx| {
                let ledger = tx.fetch_group_ledger(group_id).map_err(read_failure)?;
                let net = self
                    .balances
                    .group_net(group_id, &ledger.owed, &ledger.settlements)?;

                let tolerance = net.tolerance();
                let (debt, credit) = (net.get(user1), net.get(user2));
                let owes = debt.is_negative() && !tolerance.is_zero(debt);
                let owed = !credit.is_negative() && !tolerance.is_zero(credit);
                if !(owes && owed) {
                    return Ok(SettleOutcome::NothingToSettle);
                }

                record(
                    tx,
                    SettlementScope::Group(group_id),
                    user1,
                    user2,
                    (-debt).min(credit),
                )
            })
            .inspect(log_outcome)
    }
}

fn record(
    tx: &mut dyn LedgerTransaction,
    scope: SettlementScope,
    debtor: UserId,
    creditor: UserId,
    amount: Amount,
) -> LedgerResult<SettleOutcome> {
    let record = tx
        .record_settlement(scope, debtor, creditor, amount)
        .map_err(LedgerError::from)?;
    Ok(SettleOutcome::Settled(record))
}

fn log_outcome(outcome: &SettleOutcome) {
    match outcome {
        SettleOutcome::Settled(record) => tracing::info!(
            settlement_id = %record.id,
            scope = %record.scope,
            amount = record.amount.value(),
            "settlement recorded"
        ),
        SettleOutcome::NothingToSettle => tracing::debug!("no balance to settle"),
    }
}
