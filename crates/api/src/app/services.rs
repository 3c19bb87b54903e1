use std::sync::Arc;

use splitledger_core::{ExpenseId, GroupId, LedgerError, LedgerResult, UserId};
use splitledger_infra::{
    InMemoryLedgerStore, LedgerConfig, LedgerService, PersonalBalance, PostgresLedgerStore,
    SettleOutcome, StoreError, UserGroupBalance,
};
use splitledger_ledger::{
    ContributionRecord, ContributorEntry, ExpenseDetail, Group, NewExpense, NewGroup,
    SettlementPlan,
};

/// Ledger services shared by every handler.
///
/// Store operations are synchronous (the Postgres store drives its own queries through
/// the runtime handle), so every call runs on the blocking pool.
#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory {
        ledger: Arc<LedgerService<Arc<InMemoryLedgerStore>>>,
    },
    Persistent {
        ledger: Arc<LedgerService<PostgresLedgerStore>>,
    },
}

/// Pick the store from configuration: Postgres when a database is configured, memory otherwise.
pub async fn build_services(config: &LedgerConfig) -> Result<AppServices, StoreError> {
    match &config.database {
        Some(db) => {
            let store = PostgresLedgerStore::connect(&db.url, db.max_connections).await?;
            store.migrate().await?;
            tracing::info!(max_connections = db.max_connections, "using postgres ledger store");
            Ok(AppServices::Persistent {
                ledger: Arc::new(LedgerService::new(store)),
            })
        }
        None => {
            tracing::info!("using in-memory ledger store");
            Ok(AppServices::in_memory())
        }
    }
}

async fn run_blocking<T, F>(op: F) -> LedgerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| LedgerError::store(format!("ledger task failed: {e}")))?
}

/// Run `$body` against whichever ledger service is wired, on the blocking pool.
macro_rules! with_ledger {
    ($services:expr, |$ledger:ident| $body:expr) => {
        match $services {
            AppServices::InMemory { ledger } => {
                let $ledger = Arc::clone(ledger);
                run_blocking(move || $body).await
            }
            AppServices::Persistent { ledger } => {
                let $ledger = Arc::clone(ledger);
                run_blocking(move || $body).await
            }
        }
    };
}

impl AppServices {
    pub fn in_memory() -> Self {
        Self::InMemory {
            ledger: Arc::new(LedgerService::new(Arc::new(InMemoryLedgerStore::new()))),
        }
    }

    pub async fn create_group(&self, group: NewGroup) -> LedgerResult<Group> {
        with_ledger!(self, |ledger| ledger.create_group(group))
    }

    pub async fn group(&self, group_id: GroupId) -> LedgerResult<Group> {
        with_ledger!(self, |ledger| ledger.group(group_id))
    }

    pub async fn add_member(&self, group_id: GroupId, user_id: UserId) -> LedgerResult<Group> {
        with_ledger!(self, |ledger| ledger.add_member(group_id, user_id))
    }

    pub async fn remove_member(&self, group_id: GroupId, user_id: UserId) -> LedgerResult<Group> {
        with_ledger!(self, |ledger| ledger.remove_member(group_id, user_id))
    }

    pub async fn add_expense(
        &self,
        expense: NewExpense,
        contributors: Vec<ContributorEntry>,
    ) -> LedgerResult<ExpenseDetail> {
        with_ledger!(self, |ledger| ledger.add_expense(expense, &contributors))
    }

    pub async fn expense_contributions(
        &self,
        expense_id: ExpenseId,
    ) -> LedgerResult<Vec<ContributionRecord>> {
        with_ledger!(self, |ledger| ledger.expense_contributions(expense_id))
    }

    pub async fn group_expenses(&self, group_id: GroupId) -> LedgerResult<Vec<ExpenseDetail>> {
        with_ledger!(self, |ledger| ledger.group_expenses(group_id))
    }

    pub async fn group_settlement_plan(&self, group_id: GroupId) -> LedgerResult<SettlementPlan> {
        with_ledger!(self, |ledger| ledger.group_settlement_plan(group_id))
    }

    pub async fn user_group_balance(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> LedgerResult<UserGroupBalance> {
        with_ledger!(self, |ledger| ledger.user_group_balance(group_id, user_id))
    }

    pub async fn personal_balance(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> LedgerResult<PersonalBalance> {
        with_ledger!(self, |ledger| ledger.personal_balance(user_id, counterpart_id))
    }

    pub async fn settle_personal(
        &self,
        payer: UserId,
        payee: UserId,
    ) -> LedgerResult<SettleOutcome> {
        with_ledger!(self, |ledger| ledger.settle_personal(payer, payee))
    }

    pub async fn settle_group_pair(
        &self,
        group_id: GroupId,
        user1: UserId,
        user2: UserId,
    ) -> LedgerResult<SettleOutcome> {
        with_ledger!(self, |ledger| ledger.settle_group_pair(group_id, user1, user2))
    }
}
