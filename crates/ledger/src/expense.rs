use core::str::FromStr;

use serde::{Deserialize, Serialize};

use splitledger_core::{Amount, ExpenseId, GroupId, LedgerError, UserId};

/// Rule for dividing an expense's total among its contributors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPolicy {
    #[serde(alias = "equally")]
    Equal,
    Percentage,
    Absolute,
    #[serde(alias = "share-wise")]
    Share,
}

impl SplitPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitPolicy::Equal => "equal",
            SplitPolicy::Percentage => "percentage",
            SplitPolicy::Absolute => "absolute",
            SplitPolicy::Share => "share",
        }
    }
}

impl FromStr for SplitPolicy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal" | "equally" => Ok(SplitPolicy::Equal),
            "percentage" => Ok(SplitPolicy::Percentage),
            "absolute" => Ok(SplitPolicy::Absolute),
            "share" | "share-wise" => Ok(SplitPolicy::Share),
            _ => Err(LedgerError::invalid_split_type(s)),
        }
    }
}

impl core::fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an expense lives between two users or inside a group ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseScope {
    Personal,
    Group,
}

impl ExpenseScope {
    /// An expense attached to a group is group-scoped, anything else is personal.
    pub fn for_group(group_id: Option<GroupId>) -> Self {
        match group_id {
            Some(_) => ExpenseScope::Group,
            None => ExpenseScope::Personal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseScope::Personal => "personal",
            ExpenseScope::Group => "group",
        }
    }
}

impl FromStr for ExpenseScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(ExpenseScope::Personal),
            "group" => Ok(ExpenseScope::Group),
            other => Err(format!("unknown expense scope '{other}'")),
        }
    }
}

/// One contributor as submitted with an expense.
///
/// Exactly one of `percentage`, `share` and `amount` is meaningful, depending on the
/// expense's [`SplitPolicy`]; `equal` splits use none of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorEntry {
    pub user_id: UserId,
    /// What this user actually fronted for the expense.
    pub paid_amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
}

impl ContributorEntry {
    pub fn new(user_id: UserId, paid_amount: Amount) -> Self {
        Self {
            user_id,
            paid_amount,
            percentage: None,
            share: None,
            amount: None,
        }
    }

    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.percentage = Some(percentage);
        self
    }

    pub fn with_share(mut self, share: f64) -> Self {
        self.share = Some(share);
        self
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Expense header before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub description: String,
    pub amount: Amount,
    pub policy: SplitPolicy,
    pub created_by: UserId,
    pub group_id: Option<GroupId>,
}

impl NewExpense {
    pub fn scope(&self) -> ExpenseScope {
        ExpenseScope::for_group(self.group_id)
    }

    pub fn into_expense(self, id: ExpenseId) -> Expense {
        let scope = self.scope();
        Expense {
            id,
            description: self.description,
            amount: self.amount,
            policy: self.policy,
            scope,
            created_by: self.created_by,
            group_id: self.group_id,
        }
    }
}

/// A persisted expense. Immutable once its contributions have been computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub description: String,
    pub amount: Amount,
    pub policy: SplitPolicy,
    pub scope: ExpenseScope,
    pub created_by: UserId,
    pub group_id: Option<GroupId>,
}

/// Computed split for one contributor, not yet bound to an expense id.
///
/// The owed amount is the contribution amount: the policy is applied once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpenseLine {
    pub user_id: UserId,
    pub paid_amount: Amount,
    pub contribution_amount: Amount,
}

impl ExpenseLine {
    /// `paid − owed`: positive when the user fronted more than their share.
    pub fn balance(&self) -> Amount {
        self.paid_amount - self.contribution_amount
    }

    pub fn contribution_record(&self, expense_id: ExpenseId) -> ContributionRecord {
        ContributionRecord {
            expense_id,
            user_id: self.user_id,
            contribution_amount: self.contribution_amount,
            paid_amount: self.paid_amount,
        }
    }

    pub fn owed_record(&self, expense_id: ExpenseId) -> OwedRecord {
        OwedRecord {
            expense_id,
            user_id: self.user_id,
            owed: self.contribution_amount,
            balance: self.balance(),
        }
    }
}

/// What a user owes for an expense and what they fronted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    pub contribution_amount: Amount,
    pub paid_amount: Amount,
}

/// Owed amount and running balance (`paid − owed`) of a user for an expense.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwedRecord {
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    pub owed: Amount,
    pub balance: Amount,
}

/// An expense together with its per-contributor rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDetail {
    pub expense: Expense,
    pub contributions: Vec<ContributionRecord>,
    pub owed: Vec<OwedRecord>,
}

impl ExpenseDetail {
    pub fn from_lines(expense: Expense, lines: &[ExpenseLine]) -> Self {
        let contributions = lines
            .iter()
            .map(|l| l.contribution_record(expense.id))
            .collect();
        let owed = lines.iter().map(|l| l.owed_record(expense.id)).collect();
        Self {
            expense,
            contributions,
            owed,
        }
    }
}
