//! Ledger error model.

use thiserror::Error;

use crate::id::{GroupId, UserId};

/// Result type used across the ledger engine.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every variant is a local condition the caller can recover from; none is fatal to
/// the process. "Nothing to settle" is an expected outcome and deliberately not here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// The split policy tag is not one of `equal|percentage|absolute|share`.
    #[error("invalid split type: {0}")]
    InvalidSplitType(String),

    /// Percentages do not add up to 100, or absolute amounts do not add up to the total.
    #[error("split does not add up: expected {expected}, got {actual}")]
    SplitSumMismatch { expected: f64, actual: f64 },

    /// An expense was submitted without contributors.
    #[error("expense has no contributors")]
    EmptyContributorSet,

    /// Share weights sum to zero (or less).
    #[error("share weights must sum to a positive value (got {0})")]
    InvalidShareTotal(f64),

    /// A total, paid amount or policy parameter is negative or not finite.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The same user appears twice in one contributor list.
    #[error("user {0} appears more than once in the contributor list")]
    DuplicateContributor(UserId),

    /// Fetching or scanning ledger rows failed; no partial result is returned.
    #[error("balance aggregation failed: {0}")]
    AggregationFailure(String),

    /// A group name is empty once trimmed.
    #[error("invalid group name: {0}")]
    InvalidGroupName(String),

    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("user {user_id} is not a member of group {group_id}")]
    MemberNotFound { group_id: GroupId, user_id: UserId },

    /// Net balances do not sum to zero, so they cannot be settled.
    #[error("ledger is unbalanced: net balances sum to {total}")]
    UnbalancedLedger { total: f64 },

    /// The store failed while recording (transaction failure).
    #[error("store error: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn invalid_split_type(tag: impl Into<String>) -> Self {
        Self::InvalidSplitType(tag.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn aggregation(msg: impl Into<String>) -> Self {
        Self::AggregationFailure(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSplitType(_) => "invalid_split_type",
            Self::SplitSumMismatch { .. } => "split_sum_mismatch",
            Self::EmptyContributorSet => "empty_contributor_set",
            Self::InvalidShareTotal(_) => "invalid_share_total",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::DuplicateContributor(_) => "duplicate_contributor",
            Self::InvalidGroupName(_) => "invalid_group_name",
            Self::GroupNotFound(_) => "group_not_found",
            Self::MemberNotFound { .. } => "member_not_found",
            Self::AggregationFailure(_) => "aggregation_failure",
            Self::UnbalancedLedger { .. } => "unbalanced_ledger",
            Self::Store(_) => "store_error",
        }
    }

    /// True for errors caused by the caller's input (as opposed to ledger state or IO).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSplitType(_)
                | Self::SplitSumMismatch { .. }
                | Self::EmptyContributorSet
                | Self::InvalidShareTotal(_)
                | Self::InvalidAmount(_)
                | Self::DuplicateContributor(_)
                | Self::InvalidGroupName(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::GroupNotFound(_) | Self::MemberNotFound { .. })
    }
}
