//! Net balance aggregation over owed and settlement records.
//!
//! Positive net = the user is owed money, negative net = the user owes money.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use splitledger_core::{Amount, ExpenseId, GroupId, LedgerError, LedgerResult, Tolerance, UserId};

use crate::expense::OwedRecord;
use crate::settlement::{SettlementRecord, SettlementScope};

/// Per-user net balances, ordered by ascending user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetBalances(BTreeMap<UserId, Amount>);

impl NetBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Net balance of `user_id`; users with no records are at zero.
    pub fn get(&self, user_id: UserId) -> Amount {
        self.0.get(&user_id).copied().unwrap_or(Amount::ZERO)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.0.contains_key(&user_id)
    }

    /// Add `amount` to the user's balance, creating the entry if needed.
    pub fn credit(&mut self, user_id: UserId, amount: Amount) {
        *self.0.entry(user_id).or_insert(Amount::ZERO) += amount;
    }

    /// A payment of `amount` from `debtor` to `creditor`: the debtor's balance rises, the
    /// creditor's falls.
    pub fn apply_settlement(&mut self, debtor: UserId, creditor: UserId, amount: Amount) {
        self.credit(debtor, amount);
        self.credit(creditor, -amount);
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, Amount)> + '_ {
        self.0.iter().map(|(u, a)| (*u, *a))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Σ net`, summed in ascending user order.
    pub fn total(&self) -> Amount {
        self.0.values().sum()
    }

    /// `Σ |net|`.
    pub fn magnitude(&self) -> f64 {
        self.0.values().fold(0.0, |acc, a| acc + a.value().abs())
    }

    /// Comparison tolerance scaled to this ledger's magnitude.
    pub fn tolerance(&self) -> Tolerance {
        Tolerance::for_magnitude(self.magnitude())
    }

    pub fn non_zero_count(&self) -> usize {
        let tolerance = self.tolerance();
        self.0.values().filter(|a| !tolerance.is_zero(**a)).count()
    }

    /// True when every balance is within tolerance of zero.
    pub fn is_settled(&self) -> bool {
        self.non_zero_count() == 0
    }
}

impl FromIterator<(UserId, Amount)> for NetBalances {
    fn from_iter<I: IntoIterator<Item = (UserId, Amount)>>(iter: I) -> Self {
        let mut net = NetBalances::new();
        for (user, amount) in iter {
            net.credit(user, amount);
        }
        net
    }
}

/// One expense's contribution to the debt between two users, not netted with others.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairwiseDebt {
    pub expense_id: ExpenseId,
    pub from: UserId,
    pub to: UserId,
    pub amount: Amount,
}

/// Summary direction of a single user's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    /// Others owe this user.
    Owed,
    /// This user owes others.
    Owes,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub user_id: UserId,
    pub balance: Amount,
    pub status: BalanceStatus,
    /// Absolute value of `balance`, zero when settled.
    pub amount: Amount,
}

/// Balance aggregation service.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceAggregator;

impl BalanceAggregator {
    /// Per-expense debts between `user_id` and `counterpart_id`, ordered by expense id.
    ///
    /// `owed` holds personal-scope records; rows for other users are ignored. An expense
    /// yields a debt only when one side is negative and the other positive, for
    /// `min(debt, credit)`.
    pub fn personal_pairwise(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
        owed: &[OwedRecord],
    ) -> Vec<PairwiseDebt> {
        let mut per_expense: BTreeMap<ExpenseId, (Amount, Amount)> = BTreeMap::new();
        for row in owed {
            let entry = per_expense
                .entry(row.expense_id)
                .or_insert((Amount::ZERO, Amount::ZERO));
            if row.user_id == user_id {
                entry.0 += row.balance;
            } else if row.user_id == counterpart_id {
                entry.1 += row.balance;
            }
        }

        per_expense
            .into_iter()
            .filter_map(|(expense_id, (mine, theirs))| {
                let tolerance = Tolerance::for_magnitude(mine.value().abs() + theirs.value().abs());
                let owes = |b: Amount| b.is_negative() && !tolerance.is_zero(b);
                let owed = |b: Amount| !b.is_negative() && !tolerance.is_zero(b);

                if owes(mine) && owed(theirs) {
                    Some(PairwiseDebt {
                        expense_id,
                        from: user_id,
                        to: counterpart_id,
                        amount: (-mine).min(theirs),
                    })
                } else if owed(mine) && owes(theirs) {
                    Some(PairwiseDebt {
                        expense_id,
                        from: counterpart_id,
                        to: user_id,
                        amount: mine.min(-theirs),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Personal net balance of the pair: pairwise debts netted across expenses, then
    /// adjusted by personal settlements recorded between the two users.
    pub fn personal_net(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
        owed: &[OwedRecord],
        settlements: &[SettlementRecord],
    ) -> NetBalances {
        let mut net = NetBalances::new();
        net.credit(user_id, Amount::ZERO);
        net.credit(counterpart_id, Amount::ZERO);

        for debt in self.personal_pairwise(user_id, counterpart_id, owed) {
            net.credit(debt.from, -debt.amount);
            net.credit(debt.to, debt.amount);
        }

        let pair = |a: UserId, b: UserId| {
            (a == user_id && b == counterpart_id) || (a == counterpart_id && b == user_id)
        };
        for s in settlements
            .iter()
            .filter(|s| s.scope == SettlementScope::Personal && pair(s.debtor, s.creditor))
        {
            net.apply_settlement(s.debtor, s.creditor, s.amount);
        }

        net
    }

    /// Net balance of every user in `group_id`.
    ///
    /// Fails with `AggregationFailure` rather than returning a partial mapping when a
    /// settlement belongs to another scope or a balance is not a finite number.
    pub fn group_net(
        &self,
        group_id: GroupId,
        owed: &[OwedRecord],
        settlements: &[SettlementRecord],
    ) -> LedgerResult<NetBalances> {
        let mut net = NetBalances::new();
        for row in owed {
            net.credit(row.user_id, row.balance);
        }

        for s in settlements {
            if s.scope != SettlementScope::Group(group_id) {
                return Err(LedgerError::aggregation(format!(
                    "settlement {} does not belong to group {group_id}",
                    s.id
                )));
            }
            net.apply_settlement(s.debtor, s.creditor, s.amount);
        }

        if let Some((user, amount)) = net.iter().find(|(_, a)| !a.is_finite()) {
            return Err(LedgerError::aggregation(format!(
                "net balance of user {user} is not finite ({})",
                amount.value()
            )));
        }

        Ok(net)
    }

    /// Summarise one user's entry in `net`. Users absent from the mapping are settled.
    pub fn user_summary(&self, net: &NetBalances, user_id: UserId) -> BalanceSummary {
        let balance = net.get(user_id);
        let (status, amount) = if net.tolerance().is_zero(balance) {
            (BalanceStatus::Settled, Amount::ZERO)
        } else if balance.is_negative() {
            (BalanceStatus::Owes, balance.abs())
        } else {
            (BalanceStatus::Owed, balance)
        };

        BalanceSummary {
            user_id,
            balance,
            status,
            amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> UserId {
        UserId::new(id)
    }

    fn owed(expense: i64, user_id: i64, owed: f64, balance: f64) -> OwedRecord {
        OwedRecord {
            expense_id: ExpenseId::new(expense),
            user_id: user(user_id),
            owed: Amount::new(owed),
            balance: Amount::new(balance),
        }
    }

    #[test]
    fn pairwise_debts_are_reported_per_expense() {
        let rows = vec![
            // expense 1: user 1 fronted 60 of a 60 split, user 2 owes 30
            owed(1, 1, 30.0, 30.0),
            owed(1, 2, 30.0, -30.0),
            // expense 2: user 2 fronted, user 1 owes 10
            owed(2, 1, 10.0, -10.0),
            owed(2, 2, 10.0, 10.0),
            // expense 3: both paid their own share
            owed(3, 1, 5.0, 0.0),
            owed(3, 2, 5.0, 0.0),
        ];

        let debts = BalanceAggregator.personal_pairwise(user(1), user(2), &rows);

        assert_eq!(debts, vec![
            PairwiseDebt {
                expense_id: ExpenseId::new(1),
                from: user(2),
                to: user(1),
                amount: Amount::new(30.0),
            },
            PairwiseDebt {
                expense_id: ExpenseId::new(2),
                from: user(1),
                to: user(2),
                amount: Amount::new(10.0),
            },
        ]);
    }

    #[test]
    fn pairwise_amount_is_capped_by_smaller_side() {
        // three-way personal expense: user 2 owes 30, but user 1 is only owed 20 of it
        let rows = vec![owed(7, 1, 10.0, 20.0), owed(7, 2, 30.0, -30.0), owed(7, 3, 0.0, 10.0)];

        let debts = BalanceAggregator.personal_pairwise(user(1), user(2), &rows);

        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].amount, Amount::new(20.0));
    }

    #[test]
    fn personal_net_applies_recorded_settlements() {
        let rows = vec![owed(1, 1, 30.0, 30.0), owed(1, 2, 30.0, -30.0)];
        let settlements = vec![
            SettlementRecord::new(SettlementScope::Personal, user(2), user(1), Amount::new(12.0)),
            // a settlement with someone else does not affect this pair
            SettlementRecord::new(SettlementScope::Personal, user(2), user(9), Amount::new(99.0)),
        ];

        let net = BalanceAggregator.personal_net(user(1), user(2), &rows, &settlements);

        assert_eq!(net.get(user(1)), Amount::new(18.0));
        assert_eq!(net.get(user(2)), Amount::new(-18.0));
        assert_eq!(net.len(), 2);
    }

    #[test]
    fn group_net_sums_balances_and_settlements() {
        let group = GroupId::new(4);
        let rows = vec![
            owed(1, 1, 30.0, 60.0),
            owed(1, 2, 30.0, -30.0),
            owed(1, 3, 30.0, -30.0),
        ];
        let settlements = vec![SettlementRecord::new(
            SettlementScope::Group(group),
            user(2),
            user(1),
            Amount::new(30.0),
        )];

        let net = BalanceAggregator.group_net(group, &rows, &settlements).unwrap();

        assert_eq!(net.iter().collect::<Vec<_>>(), vec![
            (user(1), Amount::new(30.0)),
            (user(2), Amount::ZERO),
            (user(3), Amount::new(-30.0)),
        ]);
        assert!(net.tolerance().is_zero(net.total()));
    }

    #[test]
    fn group_net_rejects_foreign_settlements() {
        let foreign = SettlementRecord::new(
            SettlementScope::Group(GroupId::new(5)),
            user(1),
            user(2),
            Amount::new(1.0),
        );

        let err = BalanceAggregator
            .group_net(GroupId::new(4), &[], &[foreign])
            .unwrap_err();

        assert!(matches!(err, LedgerError::AggregationFailure(_)));
    }

    #[test]
    fn group_net_rejects_non_finite_balances() {
        let rows = vec![owed(1, 1, 0.0, f64::INFINITY)];
        let err = BalanceAggregator
            .group_net(GroupId::new(1), &rows, &[])
            .unwrap_err();
        assert!(matches!(err, LedgerError::AggregationFailure(_)));
    }

    #[test]
    fn user_summary_reports_direction() {
        let net: NetBalances = [
            (user(1), Amount::new(-50.0)),
            (user(2), Amount::new(50.0)),
            (user(3), Amount::new(1e-9)),
        ]
        .into_iter()
        .collect();

        let owes = BalanceAggregator.user_summary(&net, user(1));
        assert_eq!(owes.status, BalanceStatus::Owes);
        assert_eq!(owes.amount, Amount::new(50.0));

        assert_eq!(BalanceAggregator.user_summary(&net, user(2)).status, BalanceStatus::Owed);
        assert_eq!(BalanceAggregator.user_summary(&net, user(3)).status, BalanceStatus::Settled);
        assert_eq!(BalanceAggregator.user_summary(&net, user(42)).status, BalanceStatus::Settled);
    }

    #[test]
    fn net_balances_serialize_as_ordered_map() {
        let net: NetBalances = [(user(10), Amount::new(-5.0)), (user(2), Amount::new(5.0))]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&net).unwrap();
        assert_eq!(json, r#"{"2":5.0,"10":-5.0}"#);
    }
}
