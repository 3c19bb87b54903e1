//! Postgres-backed ledger store.
//!
//! ## Error Mapping
//!
//! | SQLx error | `StoreError` |
//! |------------|--------------|
//! | Database (any SQLSTATE) | `Query` |
//! | PoolClosed / PoolTimedOut | `Unavailable` |
//! | ColumnDecode / ColumnNotFound / Decode | `InvalidRow` |
//! | Other | `Query` |
//!
//! Begin, commit and rollback failures map to `Transaction`.
//!
//! ## Settlement transactions
//!
//! `transaction()` opens a database transaction and takes
//! `pg_advisory_xact_lock(hashtextextended(<lock key>, 0))` before running the closure,
//! so concurrent settlements on the same group (or the same personal pair) queue up
//! behind each other and each one re-reads the ledger after the previous commit. The
//! lock is released by `COMMIT`/`ROLLBACK`.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::field::Empty;
use tracing::{instrument, Span};
use uuid::Uuid;

use splitledger_core::{Amount, ExpenseId, GroupId, SettlementId, UserId};
use splitledger_ledger::{
    ContributionRecord, Expense, ExpenseDetail, ExpenseLine, ExpenseScope, Group, NewExpense,
    NewGroup, OwedRecord, SettlementRecord, SettlementScope, SplitPolicy,
};

use super::r#trait::{GroupLedger, LedgerStore, LedgerTransaction, SettlementLock, StoreError};

/// Postgres-backed ledger store.
///
/// `Send + Sync`; all access goes through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `url` and check it with a round trip.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))
    }

    #[instrument(skip(self), fields(group_id = Empty), err)]
    pub async fn insert_group(&self, group: NewGroup) -> Result<Group, StoreError> {
        let id: i64 = sqlx::query("INSERT INTO groups (name) VALUES ($1) RETURNING id")
            .bind(&group.name)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_group", e))?
            .try_get("id")
            .map_err(|e| map_sqlx_error("insert_group", e))?;

        Span::current().record("group_id", id);
        Ok(Group {
            id: GroupId::new(id),
            name: group.name,
            members: Vec::new(),
        })
    }

    #[instrument(skip(self), fields(group_id = %group_id, members = Empty), err)]
    pub async fn load_group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        let header = sqlx::query("SELECT id, name FROM groups WHERE id = $1")
            .bind(group_id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_group", e))?;
        let Some(header) = header else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT user_id FROM group_users WHERE group_id = $1 ORDER BY user_id ASC",
        )
        .bind(group_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_group_members", e))?;

        let members = rows
            .iter()
            .map(|row| get(row, "user_id").map(UserId::new))
            .collect::<Result<Vec<_>, _>>()?;
        Span::current().record("members", members.len());

        Ok(Some(Group {
            id: group_id,
            name: get(&header, "name")?,
            members,
        }))
    }

    #[instrument(skip(self), fields(group_id = %group_id, user_id = %user_id), err)]
    pub async fn insert_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO group_users (group_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (group_id, user_id) DO NOTHING
            "#,
        )
        .bind(group_id.get())
        .bind(user_id.get())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_member", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(group_id = %group_id, user_id = %user_id), err)]
    pub async fn delete_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM group_users WHERE group_id = $1 AND user_id = $2")
            .bind(group_id.get())
            .bind(user_id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_member", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(
        skip(self, expense, lines),
        fields(group_id = ?expense.group_id, line_count = lines.len(), expense_id = Empty),
        err
    )]
    pub async fn insert_expense_rows(
        &self,
        expense: NewExpense,
        lines: &[ExpenseLine],
    ) -> Result<ExpenseDetail, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_tx_error("begin_transaction", e))?;

        let id: i64 = sqlx::query(
            r#"
            INSERT INTO expenses
                (description, amount, split_type, expense_type, created_by, group_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&expense.description)
        .bind(expense.amount.value())
        .bind(expense.policy.as_str())
        .bind(expense.scope().as_str())
        .bind(expense.created_by.get())
        .bind(expense.group_id.map(GroupId::get))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_expense", e))?
        .try_get("id")
        .map_err(|e| map_sqlx_error("insert_expense", e))?;

        for (position, line) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO expense_contributors
                    (expense_id, position, user_id, contribution_amount, paid_amount)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(position as i32)
            .bind(line.user_id.get())
            .bind(line.contribution_amount.value())
            .bind(line.paid_amount.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_contribution", e))?;

            sqlx::query(
                r#"
                INSERT INTO amounts_owed (expense_id, position, user_id, owed, balance)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(position as i32)
            .bind(line.user_id.get())
            .bind(line.contribution_amount.value())
            .bind(line.balance().value())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_owed", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_tx_error("commit_transaction", e))?;

        Span::current().record("expense_id", id);
        let expense = expense.into_expense(ExpenseId::new(id));
        Ok(ExpenseDetail::from_lines(expense, lines))
    }

    #[instrument(skip(self), fields(expense_id = %expense_id), err)]
    pub async fn load_contributions(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ContributionRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT expense_id, user_id, contribution_amount, paid_amount
            FROM expense_contributors
            WHERE expense_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(expense_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_contributions", e))?;

        rows.iter()
            .map(|row| {
                Ok(ContributionRecord {
                    expense_id: ExpenseId::new(get(row, "expense_id")?),
                    user_id: UserId::new(get(row, "user_id")?),
                    contribution_amount: Amount::new(get(row, "contribution_amount")?),
                    paid_amount: Amount::new(get(row, "paid_amount")?),
                })
            })
            .collect()
    }

    #[instrument(
        skip(self),
        fields(group_id = %group_id, owed_rows = Empty, settlement_rows = Empty),
        err
    )]
    pub async fn load_group_ledger(&self, group_id: GroupId) -> Result<GroupLedger, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        let ledger = group_ledger(&mut conn, group_id).await?;

        let span = Span::current();
        span.record("owed_rows", ledger.owed.len());
        span.record("settlement_rows", ledger.settlements.len());
        Ok(ledger)
    }

    #[instrument(skip(self), fields(user_id = %user_id, counterpart_id = %counterpart_id), err)]
    pub async fn load_personal_ledger(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<OwedRecord>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        personal_ledger(&mut conn, user_id, counterpart_id).await
    }

    #[instrument(skip(self), fields(user_id = %user_id, counterpart_id = %counterpart_id), err)]
    pub async fn load_personal_settlements(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        personal_settlements(&mut conn, user_id, counterpart_id).await
    }

    #[instrument(skip(self), fields(group_id = %group_id, expense_count = Empty), err)]
    pub async fn load_group_expenses(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<ExpenseDetail>, StoreError> {
        let headers = sqlx::query(
            r#"
            SELECT id, description, amount, split_type, expense_type, created_by, group_id
            FROM expenses
            WHERE group_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(group_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_group_expenses", e))?;

        let rows = sqlx::query(
            r#"
            SELECT c.expense_id, c.user_id, c.contribution_amount, c.paid_amount
            FROM expense_contributors c
            JOIN expenses e ON e.id = c.expense_id
            WHERE e.group_id = $1
            ORDER BY c.expense_id ASC, c.position ASC
            "#,
        )
        .bind(group_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_group_expenses", e))?;

        let mut details = Vec::with_capacity(headers.len());
        for header in &headers {
            let expense = expense_from_row(header)?;
            let mut lines = Vec::new();
            for row in &rows {
                let row_expense: i64 = get(row, "expense_id")?;
                if row_expense != expense.id.get() {
                    continue;
                }
                lines.push(ExpenseLine {
                    user_id: UserId::new(get(row, "user_id")?),
                    contribution_amount: Amount::new(get(row, "contribution_amount")?),
                    paid_amount: Amount::new(get(row, "paid_amount")?),
                });
            }
            details.push(ExpenseDetail::from_lines(expense, &lines));
        }

        Span::current().record("expense_count", details.len());
        Ok(details)
    }

    /// Begin a transaction and take the advisory lock for `lock`.
    #[instrument(skip(self), fields(lock = %lock.key()), err)]
    pub async fn begin_locked(
        &self,
        lock: &SettlementLock,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_tx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock.key())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_tx_error("advisory_lock", e))?;

        Ok(tx)
    }
}

async fn group_ledger(
    conn: &mut PgConnection,
    group_id: GroupId,
) -> Result<GroupLedger, StoreError> {
    let owed_rows = sqlx::query(
        r#"
        SELECT ao.expense_id, ao.user_id, ao.owed, ao.balance
        FROM amounts_owed ao
        JOIN expenses e ON e.id = ao.expense_id
        WHERE e.group_id = $1 AND e.expense_type = 'group'
        ORDER BY ao.expense_id ASC, ao.position ASC
        "#,
    )
    .bind(group_id.get())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("group_ledger", e))?;

    let settlement_rows = sqlx::query(
        r#"
        SELECT id, group_id, debtor_id, creditor_id, amount, created_at
        FROM group_settlements
        WHERE group_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(group_id.get())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("group_settlements", e))?;

    Ok(GroupLedger {
        owed: owed_rows.iter().map(owed_from_row).collect::<Result<_, _>>()?,
        settlements: settlement_rows
            .iter()
            .map(|row| settlement_from_row(row, SettlementScope::Group(group_id)))
            .collect::<Result<_, _>>()?,
    })
}

async fn personal_ledger(
    conn: &mut PgConnection,
    user_id: UserId,
    counterpart_id: UserId,
) -> Result<Vec<OwedRecord>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT ao.expense_id, ao.user_id, ao.owed, ao.balance
        FROM amounts_owed ao
        JOIN expenses e ON e.id = ao.expense_id
        WHERE e.expense_type = 'personal'
            AND ao.user_id IN ($1, $2)
            AND EXISTS (
                SELECT 1 FROM amounts_owed a1 WHERE a1.expense_id = e.id AND a1.user_id = $1
            )
            AND EXISTS (
                SELECT 1 FROM amounts_owed a2 WHERE a2.expense_id = e.id AND a2.user_id = $2
            )
        ORDER BY ao.expense_id ASC, ao.position ASC
        "#,
    )
    .bind(user_id.get())
    .bind(counterpart_id.get())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("personal_ledger", e))?;

    rows.iter().map(owed_from_row).collect()
}

async fn personal_settlements(
    conn: &mut PgConnection,
    user_id: UserId,
    counterpart_id: UserId,
) -> Result<Vec<SettlementRecord>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, debtor_id, creditor_id, amount, created_at
        FROM personal_settlements
        WHERE (debtor_id = $1 AND creditor_id = $2) OR (debtor_id = $2 AND creditor_id = $1)
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(user_id.get())
    .bind(counterpart_id.get())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("personal_settlements", e))?;

    rows.iter()
        .map(|row| settlement_from_row(row, SettlementScope::Personal))
        .collect()
}

async fn insert_settlement(
    conn: &mut PgConnection,
    record: &SettlementRecord,
) -> Result<(), StoreError> {
    let (sql, group_id) = match record.scope {
        SettlementScope::Personal => (
            r#"
            INSERT INTO personal_settlements (id, debtor_id, creditor_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            None,
        ),
        SettlementScope::Group(group_id) => (
            r#"
            INSERT INTO group_settlements (id, debtor_id, creditor_id, amount, created_at, group_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            Some(group_id.get()),
        ),
    };

    let mut query = sqlx::query(sql)
        .bind(*record.id.as_uuid())
        .bind(record.debtor.get())
        .bind(record.creditor.get())
        .bind(record.amount.value())
        .bind(record.created_at);
    if let Some(group_id) = group_id {
        query = query.bind(group_id);
    }

    query
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_settlement", e))?;
    Ok(())
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::InvalidRow(format!("column {column}: {e}")))
}

fn owed_from_row(row: &PgRow) -> Result<OwedRecord, StoreError> {
    Ok(OwedRecord {
        expense_id: ExpenseId::new(get(row, "expense_id")?),
        user_id: UserId::new(get(row, "user_id")?),
        owed: Amount::new(get(row, "owed")?),
        balance: Amount::new(get(row, "balance")?),
    })
}

fn settlement_from_row(
    row: &PgRow,
    scope: SettlementScope,
) -> Result<SettlementRecord, StoreError> {
    let id: Uuid = get(row, "id")?;
    let created_at: DateTime<Utc> = get(row, "created_at")?;
    Ok(SettlementRecord {
        id: SettlementId::from_uuid(id),
        scope,
        debtor: UserId::new(get(row, "debtor_id")?),
        creditor: UserId::new(get(row, "creditor_id")?),
        amount: Amount::new(get(row, "amount")?),
        created_at,
    })
}

fn expense_from_row(row: &PgRow) -> Result<Expense, StoreError> {
    let split_type: String = get(row, "split_type")?;
    let expense_type: String = get(row, "expense_type")?;
    let group_id: Option<i64> = get(row, "group_id")?;

    Ok(Expense {
        id: ExpenseId::new(get(row, "id")?),
        description: get(row, "description")?,
        amount: Amount::new(get(row, "amount")?),
        policy: SplitPolicy::from_str(&split_type)
            .map_err(|e| StoreError::InvalidRow(e.to_string()))?,
        scope: ExpenseScope::from_str(&expense_type).map_err(StoreError::InvalidRow)?,
        created_by: UserId::new(get(row, "created_by")?),
        group_id: group_id.map(GroupId::new),
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            StoreError::Query(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => StoreError::InvalidRow(format!("{operation}: {err}")),
        _ => StoreError::Query(format!("sqlx error in {operation}: {err}")),
    }
}

fn map_tx_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Transaction(format!("{operation}: {err}"))
}

fn runtime_handle() -> Result<Handle, StoreError> {
    Handle::try_current().map_err(|_| {
        StoreError::Unavailable(
            "PostgresLedgerStore requires a tokio runtime; call it from a blocking task inside one"
                .to_string(),
        )
    })
}

// Implement LedgerStore trait

impl LedgerStore for PostgresLedgerStore {
    fn create_group(&self, group: NewGroup) -> Result<Group, StoreError> {
        runtime_handle()?.block_on(self.insert_group(group))
    }

    fn fetch_group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        runtime_handle()?.block_on(self.load_group(group_id))
    }

    fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError> {
        runtime_handle()?.block_on(self.insert_member(group_id, user_id))
    }

    fn remove_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError> {
        runtime_handle()?.block_on(self.delete_member(group_id, user_id))
    }

    fn insert_expense(
        &self,
        expense: NewExpense,
        lines: &[ExpenseLine],
    ) -> Result<ExpenseDetail, StoreError> {
        runtime_handle()?.block_on(self.insert_expense_rows(expense, lines))
    }

    fn fetch_contributions(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ContributionRecord>, StoreError> {
        runtime_handle()?.block_on(self.load_contributions(expense_id))
    }

    fn fetch_group_ledger(&self, group_id: GroupId) -> Result<GroupLedger, StoreError> {
        runtime_handle()?.block_on(self.load_group_ledger(group_id))
    }

    fn fetch_personal_ledger(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<OwedRecord>, StoreError> {
        runtime_handle()?.block_on(self.load_personal_ledger(user_id, counterpart_id))
    }

    fn fetch_personal_settlements(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        runtime_handle()?.block_on(self.load_personal_settlements(user_id, counterpart_id))
    }

    fn fetch_group_expenses(&self, group_id: GroupId) -> Result<Vec<ExpenseDetail>, StoreError> {
        runtime_handle()?.block_on(self.load_group_expenses(group_id))
    }

    fn transaction<T, E, F>(&self, lock: SettlementLock, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let handle = runtime_handle()?;
        let tx = handle.block_on(self.begin_locked(&lock))?;
        let mut scope = PgLedgerTransaction {
            handle: handle.clone(),
            tx,
        };

        match f(&mut scope) {
            Ok(value) => {
                handle
                    .block_on(scope.tx.commit())
                    .map_err(|e| map_tx_error("commit_transaction", e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = handle.block_on(scope.tx.rollback()) {
                    tracing::warn!(lock = %lock.key(), error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Open Postgres transaction driven synchronously from a blocking thread.
struct PgLedgerTransaction {
    handle: Handle,
    tx: Transaction<'static, Postgres>,
}

impl LedgerTransaction for PgLedgerTransaction {
    fn fetch_group_ledger(&mut self, group_id: GroupId) -> Result<GroupLedger, StoreError> {
        self.handle.block_on(group_ledger(&mut self.tx, group_id))
    }

    fn fetch_personal_ledger(
        &mut self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<OwedRecord>, StoreError> {
        self.handle
            .block_on(personal_ledger(&mut self.tx, user_id, counterpart_id))
    }

    fn fetch_personal_settlements(
        &mut self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        self.handle
            .block_on(personal_settlements(&mut self.tx, user_id, counterpart_id))
    }

    fn record_settlement(
        &mut self,
        scope: SettlementScope,
        debtor: UserId,
        creditor: UserId,
        amount: Amount,
    ) -> Result<SettlementRecord, StoreError> {
        let record = SettlementRecord::new(scope, debtor, creditor, amount);
        self.handle.block_on(insert_settlement(&mut self.tx, &record))?;
        Ok(record)
    }
}
