use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use splitledger_core::{Amount, ExpenseId, GroupId, UserId};
use splitledger_ledger::{
    BalanceAggregator, ContributorEntry, NetBalances, OwedRecord, SettlementPlanner,
    SplitCalculator, SplitPolicy,
};

/// Deterministic balanced ledger: alternating debtors and creditors with uneven amounts,
/// the last user absorbing the remainder.
fn balanced_ledger(users: usize) -> NetBalances {
    let mut net = NetBalances::new();
    let mut running = 0.0f64;
    for i in 0..users.saturating_sub(1) {
        let magnitude = ((i * 37) % 500 + 1) as f64 + 0.25;
        let amount = if i % 2 == 0 { -magnitude } else { magnitude };
        running += amount;
        net.credit(UserId::new(i as i64 + 1), Amount::new(amount));
    }
    net.credit(UserId::new(users as i64), Amount::new(-running));
    net
}

/// Owed rows for `expenses` group expenses, each fronted by one member and split equally.
fn group_rows(members: usize, expenses: usize) -> Vec<OwedRecord> {
    let mut rows = Vec::with_capacity(members * expenses);
    for e in 0..expenses {
        let payer = e % members;
        let entries: Vec<ContributorEntry> = (0..members)
            .map(|m| {
                let paid = if m == payer { 90.0 } else { 0.0 };
                ContributorEntry::new(UserId::new(m as i64 + 1), Amount::new(paid))
            })
            .collect();
        let lines = SplitCalculator
            .lines(Amount::new(90.0), SplitPolicy::Equal, &entries)
            .unwrap();
        rows.extend(lines.iter().map(|l| l.owed_record(ExpenseId::new(e as i64 + 1))));
    }
    rows
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement_plan");

    for users in [4usize, 32, 256, 2048].iter() {
        let ledger = balanced_ledger(*users);
        group.throughput(Throughput::Elements(*users as u64));
        group.bench_with_input(BenchmarkId::new("greedy", users), &ledger, |b, ledger| {
            b.iter(|| SettlementPlanner.plan(black_box(ledger)).unwrap());
        });
    }

    group.finish();
}

fn bench_group_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_aggregation");

    for expenses in [10usize, 100, 1000].iter() {
        let rows = group_rows(8, *expenses);
        group.throughput(Throughput::Elements(rows.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("net_then_plan", expenses),
            &rows,
            |b, rows| {
                b.iter(|| {
                    let net = BalanceAggregator
                        .group_net(GroupId::new(1), black_box(rows), &[])
                        .unwrap();
                    SettlementPlanner.plan(&net).unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_plan, bench_group_aggregation);
criterion_main!(benches);
