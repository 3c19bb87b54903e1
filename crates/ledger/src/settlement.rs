//! Settlement records and the greedy debt-simplification planner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::{Amount, GroupId, LedgerError, LedgerResult, SettlementId, UserId};

use crate::balance::NetBalances;

/// Ledger a settlement is recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "group_id")]
pub enum SettlementScope {
    Personal,
    Group(GroupId),
}

impl SettlementScope {
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            SettlementScope::Personal => None,
            SettlementScope::Group(id) => Some(*id),
        }
    }
}

impl core::fmt::Display for SettlementScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SettlementScope::Personal => f.write_str("personal"),
            SettlementScope::Group(id) => write!(f, "group:{id}"),
        }
    }
}

/// An append-only record of `debtor` paying `creditor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: SettlementId,
    pub scope: SettlementScope,
    pub debtor: UserId,
    pub creditor: UserId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl SettlementRecord {
    pub fn new(scope: SettlementScope, debtor: UserId, creditor: UserId, amount: Amount) -> Self {
        Self {
            id: SettlementId::new(),
            scope,
            debtor,
            creditor,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// A planned payment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: UserId,
    pub to: UserId,
    pub amount: Amount,
}

/// A balance the planner could not pair off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Residual {
    pub user_id: UserId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub transfers: Vec<Transfer>,
    /// Balances still beyond tolerance once one side ran out. Empty for a balanced input
    /// unless rounding left something behind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub residuals: Vec<Residual>,
}

impl SettlementPlan {
    /// Transfers where `user_id` pays or is paid, in plan order.
    pub fn involving(&self, user_id: UserId) -> Vec<Transfer> {
        self.transfers
            .iter()
            .filter(|t| t.from == user_id || t.to == user_id)
            .copied()
            .collect()
    }

    /// Replay the transfers onto `net`, returning the post-settlement balances.
    pub fn apply_to(&self, net: &NetBalances) -> NetBalances {
        let mut after = net.clone();
        for t in &self.transfers {
            after.apply_settlement(t.from, t.to, t.amount);
        }
        after
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }
}

/// Greedy debt simplifier.
///
/// Pairs the lowest-id debtor with the lowest-id creditor until one side runs out. Each
/// step zeroes at least one of the two exactly, so the loop runs at most `k − 1` times.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementPlanner;

impl SettlementPlanner {
    pub fn plan(&self, net: &NetBalances) -> LedgerResult<SettlementPlan> {
        let tolerance = net.tolerance();
        let total = net.total();
        if !tolerance.is_zero(total) {
            return Err(LedgerError::UnbalancedLedger {
                total: total.value(),
            });
        }

        let mut debtors: Vec<(UserId, Amount)> = Vec::new();
        let mut creditors: Vec<(UserId, Amount)> = Vec::new();
        for (user, balance) in net.iter() {
            if tolerance.is_zero(balance) {
                continue;
            }
            if balance.is_negative() {
                debtors.push((user, balance));
            } else {
                creditors.push((user, balance));
            }
        }

        let mut transfers = Vec::with_capacity(debtors.len() + creditors.len());
        let (mut d, mut c) = (0, 0);
        while d < debtors.len() && c < creditors.len() {
            let (debtor, owes) = debtors[d];
            let (creditor, owed) = creditors[c];
            let amount = (-owes).min(owed);
            transfers.push(Transfer {
                from: debtor,
                to: creditor,
                amount,
            });

            debtors[d].1 += amount;
            creditors[c].1 -= amount;
            if tolerance.is_zero(debtors[d].1) {
                d += 1;
            }
            if tolerance.is_zero(creditors[c].1) {
                c += 1;
            }
        }

        let residuals: Vec<Residual> = debtors[d..]
            .iter()
            .chain(creditors[c..].iter())
            .filter(|(_, amount)| !tolerance.is_zero(*amount))
            .map(|(user_id, amount)| Residual {
                user_id: *user_id,
                amount: *amount,
            })
            .collect();
        if !residuals.is_empty() {
            tracing::warn!(
                residual_count = residuals.len(),
                epsilon = tolerance.epsilon(),
                "settlement plan left balances unpaired"
            );
        }

        tracing::debug!(transfers = transfers.len(), "settlement plan computed");
        Ok(SettlementPlan {
            transfers,
            residuals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(id: i64) -> UserId {
        UserId::new(id)
    }

    fn net(entries: &[(i64, f64)]) -> NetBalances {
        entries
            .iter()
            .map(|(u, a)| (user(*u), Amount::new(*a)))
            .collect()
    }

    #[test]
    fn balance_without_counterparty_is_reported_as_residual() {
        // three debts below tolerance add up to one credit just above it
        let ledger = net(&[(1, 1.5e-6), (2, -0.5e-6), (3, -0.5e-6), (4, -0.5e-6)]);

        let plan = SettlementPlanner.plan(&ledger).unwrap();

        assert!(plan.transfers.is_empty());
        assert_eq!(plan.residuals, vec![Residual {
            user_id: user(1),
            amount: Amount::new(1.5e-6),
        }]);
    }

    #[test]
    fn one_debtor_pays_creditors_in_id_order() {
        let plan = SettlementPlanner
            .plan(&net(&[(1, -50.0), (2, 30.0), (3, 20.0)]))
            .unwrap();

        assert_eq!(plan.transfers, vec![
            Transfer {
                from: user(1),
                to: user(2),
                amount: Amount::new(30.0),
            },
            Transfer {
                from: user(1),
                to: user(3),
                amount: Amount::new(20.0),
            },
        ]);
        assert!(plan.residuals.is_empty());
    }

    #[test]
    fn settled_pair_replans_to_nothing() {
        let before = net(&[(1, -10.0), (2, 10.0)]);
        let plan = SettlementPlanner.plan(&before).unwrap();
        assert_eq!(plan.len(), 1);

        let after = plan.apply_to(&before);
        assert!(after.is_settled());
        assert!(SettlementPlanner.plan(&after).unwrap().is_empty());
    }

    #[test]
    fn empty_and_zero_balances_need_no_transfers() {
        assert!(SettlementPlanner.plan(&NetBalances::new()).unwrap().is_empty());
        assert!(SettlementPlanner.plan(&net(&[(1, 0.0), (2, 1e-9)])).unwrap().is_empty());
    }

    #[test]
    fn unbalanced_ledger_is_rejected() {
        let err = SettlementPlanner
            .plan(&net(&[(1, -10.0), (2, 5.0)]))
            .unwrap_err();
        assert_eq!(err, LedgerError::UnbalancedLedger { total: -5.0 });
    }

    #[test]
    fn disjoint_zero_sum_subsets_need_fewer_transfers() {
        // {1,3} and {2,4} cancel independently.
        let plan = SettlementPlanner
            .plan(&net(&[(1, -10.0), (2, -10.0), (3, 10.0), (4, 10.0)]))
            .unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn involving_filters_by_participant() {
        let plan = SettlementPlanner
            .plan(&net(&[(1, -50.0), (2, 30.0), (3, 20.0)]))
            .unwrap();

        assert_eq!(plan.involving(user(3)), vec![Transfer {
            from: user(1),
            to: user(3),
            amount: Amount::new(20.0),
        }]);
        assert_eq!(plan.involving(user(1)).len(), 2);
        assert!(plan.involving(user(9)).is_empty());
    }

    #[test]
    fn rounding_noise_is_absorbed() {
        let third = 100.0 / 3.0;
        let plan = SettlementPlanner
            .plan(&net(&[(1, -100.0), (2, third), (3, third), (4, third)]))
            .unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.residuals.is_empty());
    }

    /// Balanced ledgers: random balances for all but the last user, who absorbs the sum.
    fn balanced_ledger() -> impl Strategy<Value = NetBalances> {
        prop::collection::vec(-10_000i64..10_000, 1..24).prop_map(|cents| {
            let mut entries: Vec<(UserId, Amount)> = cents
                .iter()
                .enumerate()
                .map(|(i, c)| (UserId::new(i as i64 + 1), Amount::new(*c as f64 / 100.0)))
                .collect();
            let total: i64 = cents.iter().sum();
            entries.push((
                UserId::new(cents.len() as i64 + 1),
                Amount::new(-(total as f64) / 100.0),
            ));
            entries.into_iter().collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: applying the plan drives every balance to zero.
        #[test]
        fn applying_plan_settles_everyone(ledger in balanced_ledger()) {
            let plan = SettlementPlanner.plan(&ledger).unwrap();
            let after = plan.apply_to(&ledger);

            prop_assert!(after.is_settled(), "left over: {:?}", after);
            prop_assert!(plan.residuals.is_empty());
        }

        /// Property: no more than k - 1 transfers for k non-zero balances.
        #[test]
        fn transfer_count_is_bounded(ledger in balanced_ledger()) {
            let k = ledger.non_zero_count();
            let plan = SettlementPlanner.plan(&ledger).unwrap();

            prop_assert!(plan.len() <= k.saturating_sub(1));
            prop_assert!(plan.transfers.iter().all(|t| !t.amount.is_negative()));
        }

        /// Property: re-planning the post-settlement balances yields nothing.
        #[test]
        fn planning_is_idempotent(ledger in balanced_ledger()) {
            let after = SettlementPlanner.plan(&ledger).unwrap().apply_to(&ledger);
            prop_assert!(SettlementPlanner.plan(&after).unwrap().is_empty());
        }
    }
}
