//! Split calculation: expense total + contributors → per-contributor share.
//!
//! Pure and deterministic. Contributors are processed (and summed) in the order the
//! caller supplies them, so the same input always yields bit-identical output.

use std::collections::HashSet;

use splitledger_core::{Amount, LedgerError, LedgerResult, Tolerance, UserId};

use crate::expense::{ContributorEntry, ExpenseLine, SplitPolicy};

/// Per-contributor contribution amounts, in contributor order.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    shares: Vec<(UserId, Amount)>,
}

impl Split {
    pub fn get(&self, user_id: UserId) -> Option<Amount> {
        self.shares
            .iter()
            .find(|(u, _)| *u == user_id)
            .map(|(_, a)| *a)
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, Amount)> + '_ {
        self.shares.iter().copied()
    }

    pub fn total(&self) -> Amount {
        self.shares.iter().map(|(_, a)| *a).sum()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

/// Split calculation service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitCalculator;

impl SplitCalculator {
    /// Compute each contributor's contribution (= owed) amount under `policy`.
    pub fn compute_split(
        &self,
        total: Amount,
        policy: SplitPolicy,
        contributors: &[ContributorEntry],
    ) -> LedgerResult<Split> {
        ensure_non_negative("expense amount", total)?;
        if contributors.is_empty() {
            return Err(LedgerError::EmptyContributorSet);
        }

        let mut seen = HashSet::with_capacity(contributors.len());
        for c in contributors {
            if !seen.insert(c.user_id) {
                return Err(LedgerError::DuplicateContributor(c.user_id));
            }
            ensure_non_negative("paid amount", c.paid_amount)?;
        }

        let shares = match policy {
            SplitPolicy::Equal => {
                let per_head = total / contributors.len() as f64;
                contributors.iter().map(|c| (c.user_id, per_head)).collect()
            }
            SplitPolicy::Percentage => {
                let percentages = contributors
                    .iter()
                    .map(|c| ensure_weight("percentage", c.percentage.unwrap_or(0.0)))
                    .collect::<LedgerResult<Vec<f64>>>()?;
                let sum: f64 = percentages.iter().fold(0.0, |acc, p| acc + p);
                let hundred = Amount::new(100.0);
                if !Tolerance::for_magnitude(100.0).approx_eq(Amount::new(sum), hundred) {
                    return Err(LedgerError::SplitSumMismatch {
                        expected: 100.0,
                        actual: sum,
                    });
                }
                contributors
                    .iter()
                    .zip(percentages)
                    .map(|(c, pct)| (c.user_id, total * (pct / 100.0)))
                    .collect()
            }
            SplitPolicy::Absolute => {
                let amounts = contributors
                    .iter()
                    .map(|c| {
                        let amount = c.amount.unwrap_or(Amount::ZERO);
                        ensure_non_negative("absolute amount", amount).map(|()| amount)
                    })
                    .collect::<LedgerResult<Vec<Amount>>>()?;
                let sum: Amount = amounts.iter().sum();
                if !Tolerance::for_magnitude(total.value()).approx_eq(sum, total) {
                    return Err(LedgerError::SplitSumMismatch {
                        expected: total.value(),
                        actual: sum.value(),
                    });
                }
                contributors
                    .iter()
                    .zip(amounts)
                    .map(|(c, amount)| (c.user_id, amount))
                    .collect()
            }
            SplitPolicy::Share => {
                let weights = contributors
                    .iter()
                    .map(|c| ensure_weight("share", c.share.unwrap_or(0.0)))
                    .collect::<LedgerResult<Vec<f64>>>()?;
                let total_shares: f64 = weights.iter().fold(0.0, |acc, w| acc + w);
                if total_shares <= 0.0 {
                    return Err(LedgerError::InvalidShareTotal(total_shares));
                }
                contributors
                    .iter()
                    .zip(weights)
                    .map(|(c, w)| (c.user_id, total * (w / total_shares)))
                    .collect()
            }
        };

        Ok(Split { shares })
    }

    /// Compute the split and pair it with each contributor's paid amount.
    ///
    /// Paid amounts must cover the total exactly (within tolerance), so the balances of
    /// the resulting lines always cancel out.
    pub fn lines(
        &self,
        total: Amount,
        policy: SplitPolicy,
        contributors: &[ContributorEntry],
    ) -> LedgerResult<Vec<ExpenseLine>> {
        let split = self.compute_split(total, policy, contributors)?;

        let paid: Amount = contributors.iter().map(|c| c.paid_amount).sum();
        if !Tolerance::for_magnitude(total.value()).approx_eq(paid, total) {
            return Err(LedgerError::SplitSumMismatch {
                expected: total.value(),
                actual: paid.value(),
            });
        }

        Ok(contributors
            .iter()
            .zip(split.iter())
            .map(|(c, (_, contribution))| ExpenseLine {
                user_id: c.user_id,
                paid_amount: c.paid_amount,
                contribution_amount: contribution,
            })
            .collect())
    }
}

fn ensure_non_negative(what: &str, amount: Amount) -> LedgerResult<()> {
    if !amount.is_finite() || amount.is_negative() {
        return Err(LedgerError::invalid_amount(format!(
            "{what} must be a non-negative number (got {})",
            amount.value()
        )));
    }
    Ok(())
}

fn ensure_weight(what: &str, weight: f64) -> LedgerResult<f64> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(LedgerError::invalid_amount(format!(
            "{what} must be a non-negative number (got {weight})"
        )));
    }
    Ok(weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(id: i64) -> UserId {
        UserId::new(id)
    }

    fn entry(id: i64) -> ContributorEntry {
        ContributorEntry::new(user(id), Amount::ZERO)
    }

    #[test]
    fn equal_split_divides_evenly() {
        let split = SplitCalculator
            .compute_split(
                Amount::new(90.0),
                SplitPolicy::Equal,
                &[entry(1), entry(2), entry(3)],
            )
            .unwrap();

        for id in 1..=3 {
            assert_eq!(split.get(user(id)), Some(Amount::new(30.0)));
        }
    }

    #[test]
    fn percentage_split_scales_total() {
        let split = SplitCalculator
            .compute_split(
                Amount::new(200.0),
                SplitPolicy::Percentage,
                &[entry(1).with_percentage(60.0), entry(2).with_percentage(40.0)],
            )
            .unwrap();

        assert_eq!(split.get(user(1)), Some(Amount::new(120.0)));
        assert_eq!(split.get(user(2)), Some(Amount::new(80.0)));
    }

    #[test]
    fn share_split_weights_contributors() {
        let split = SplitCalculator
            .compute_split(
                Amount::new(100.0),
                SplitPolicy::Share,
                &[entry(1).with_share(1.0), entry(2).with_share(3.0)],
            )
            .unwrap();

        assert_eq!(split.get(user(1)), Some(Amount::new(25.0)));
        assert_eq!(split.get(user(2)), Some(Amount::new(75.0)));
    }

    #[test]
    fn absolute_split_takes_amounts_verbatim() {
        let split = SplitCalculator
            .compute_split(
                Amount::new(50.0),
                SplitPolicy::Absolute,
                &[
                    entry(1).with_amount(Amount::new(12.5)),
                    entry(2).with_amount(Amount::new(37.5)),
                ],
            )
            .unwrap();

        assert_eq!(split.iter().collect::<Vec<_>>(), vec![
            (user(1), Amount::new(12.5)),
            (user(2), Amount::new(37.5)),
        ]);
    }

    #[test]
    fn percentages_must_sum_to_one_hundred() {
        let err = SplitCalculator
            .compute_split(
                Amount::new(200.0),
                SplitPolicy::Percentage,
                &[entry(1).with_percentage(60.0), entry(2).with_percentage(30.0)],
            )
            .unwrap_err();

        assert_eq!(err, LedgerError::SplitSumMismatch {
            expected: 100.0,
            actual: 90.0,
        });
    }

    #[test]
    fn absolute_amounts_must_sum_to_total() {
        let err = SplitCalculator
            .compute_split(
                Amount::new(100.0),
                SplitPolicy::Absolute,
                &[entry(1).with_amount(Amount::new(60.0)), entry(2)],
            )
            .unwrap_err();

        assert!(matches!(err, LedgerError::SplitSumMismatch { .. }));
    }

    #[test]
    fn zero_share_total_is_rejected() {
        let err = SplitCalculator
            .compute_split(
                Amount::new(100.0),
                SplitPolicy::Share,
                &[entry(1).with_share(0.0), entry(2)],
            )
            .unwrap_err();

        assert_eq!(err, LedgerError::InvalidShareTotal(0.0));
    }

    #[test]
    fn empty_contributors_are_rejected_for_every_policy() {
        for policy in [
            SplitPolicy::Equal,
            SplitPolicy::Percentage,
            SplitPolicy::Absolute,
            SplitPolicy::Share,
        ] {
            let err = SplitCalculator
                .compute_split(Amount::new(10.0), policy, &[])
                .unwrap_err();
            assert_eq!(err, LedgerError::EmptyContributorSet);
        }
    }

    #[test]
    fn duplicate_and_negative_inputs_are_rejected() {
        let err = SplitCalculator
            .compute_split(Amount::new(10.0), SplitPolicy::Equal, &[entry(1), entry(1)])
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicateContributor(user(1)));

        let err = SplitCalculator
            .compute_split(Amount::new(-10.0), SplitPolicy::Equal, &[entry(1)])
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let err = SplitCalculator
            .compute_split(
                Amount::new(10.0),
                SplitPolicy::Share,
                &[entry(1).with_share(f64::NAN)],
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[test]
    fn lines_carry_paid_amounts_and_balances() {
        let lines = SplitCalculator
            .lines(
                Amount::new(90.0),
                SplitPolicy::Equal,
                &[
                    ContributorEntry::new(user(1), Amount::new(90.0)),
                    entry(2),
                    entry(3),
                ],
            )
            .unwrap();

        assert_eq!(lines[0].balance(), Amount::new(60.0));
        assert_eq!(lines[1].balance(), Amount::new(-30.0));
        let total: Amount = lines.iter().map(|l| l.balance()).sum();
        assert!(Tolerance::default().is_zero(total));
    }

    #[test]
    fn paid_amounts_must_cover_the_total() {
        let err = SplitCalculator
            .lines(Amount::new(50.0), SplitPolicy::Equal, &[entry(1), entry(2)])
            .unwrap_err();
        assert_eq!(err, LedgerError::SplitSumMismatch {
            expected: 50.0,
            actual: 0.0,
        });

        let err = SplitCalculator
            .lines(
                Amount::new(50.0),
                SplitPolicy::Equal,
                &[
                    ContributorEntry::new(user(1), Amount::new(40.0)),
                    ContributorEntry::new(user(2), Amount::new(20.0)),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::SplitSumMismatch { .. }));

        let lines = SplitCalculator
            .lines(
                Amount::new(50.0),
                SplitPolicy::Equal,
                &[
                    ContributorEntry::new(user(1), Amount::new(30.0)),
                    ContributorEntry::new(user(2), Amount::new(20.0)),
                ],
            )
            .unwrap();
        assert_eq!(lines[1].balance(), Amount::new(-5.0));
    }

    fn policy_and_entries() -> impl Strategy<Value = (f64, SplitPolicy, Vec<ContributorEntry>)> {
        (1usize..=8, 0.0f64..100_000.0).prop_flat_map(|(n, total)| {
            let weights = prop::collection::vec(1u32..1_000, n);
            (Just(total), 0usize..4, weights).prop_map(move |(total, p, weights)| {
                let weight_sum: u32 = weights.iter().sum();
                let mut entries = Vec::with_capacity(n);
                let mut assigned = 0.0f64;
                for (idx, w) in weights.iter().enumerate() {
                    let mut e = ContributorEntry::new(UserId::new(idx as i64 + 1), Amount::ZERO);
                    let fraction = f64::from(*w) / f64::from(weight_sum);
                    e.percentage = Some(fraction * 100.0);
                    e.share = Some(f64::from(*w));
                    let absolute = if idx + 1 == n { total - assigned } else { total * fraction };
                    assigned += absolute;
                    e.amount = Some(Amount::new(absolute.max(0.0)));
                    entries.push(e);
                }
                let policy = [
                    SplitPolicy::Equal,
                    SplitPolicy::Percentage,
                    SplitPolicy::Absolute,
                    SplitPolicy::Share,
                ][p];
                (total, policy, entries)
            })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for every policy, contributions add back up to the expense total.
        #[test]
        fn contributions_sum_to_total((total, policy, entries) in policy_and_entries()) {
            let split = SplitCalculator
                .compute_split(Amount::new(total), policy, &entries)
                .unwrap();

            prop_assert_eq!(split.len(), entries.len());
            prop_assert!(
                Tolerance::for_magnitude(total).approx_eq(split.total(), Amount::new(total)),
                "total {} vs split {}", total, split.total().value()
            );
        }

        /// Property: whenever paid amounts cover the expense, balances cancel out.
        #[test]
        fn balances_sum_to_zero((total, policy, mut entries) in policy_and_entries()) {
            entries[0].paid_amount = Amount::new(total);
            let lines = SplitCalculator
                .lines(Amount::new(total), policy, &entries)
                .unwrap();

            let balance: Amount = lines.iter().map(|l| l.balance()).sum();
            prop_assert!(Tolerance::for_magnitude(total).is_zero(balance));
        }
    }
}
