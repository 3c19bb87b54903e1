use serde::Deserialize;
use serde_json::{json, Value};

use splitledger_core::{Amount, GroupId, UserId};
use splitledger_infra::SettleOutcome;
use splitledger_ledger::{ContributorEntry, NewExpense, SplitPolicy};

use crate::app::errors;

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub amount: f64,
    /// Parsed by hand so an unknown tag is reported as `invalid_split_type`.
    pub split_type: String,
    #[serde(default)]
    pub description: String,
    pub created_by: UserId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub contributors: Vec<ContributorEntry>,
}

impl CreateExpenseRequest {
    pub fn into_parts(
        self,
    ) -> Result<(NewExpense, Vec<ContributorEntry>), axum::response::Response> {
        let policy: SplitPolicy = self
            .split_type
            .parse()
            .map_err(errors::ledger_error_to_response)?;

        let expense = NewExpense {
            description: self.description,
            amount: Amount::new(self.amount),
            policy,
            created_by: self.created_by,
            group_id: self.group_id,
        };
        Ok((expense, self.contributors))
    }
}

/// Membership change body, camelCase on the wire (`{"groupId": 1, "userId": 2}`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberRequest {
    #[serde(alias = "group_id")]
    pub group_id: GroupId,
    #[serde(alias = "user_id")]
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct SettlePersonalRequest {
    pub payer_id: UserId,
    pub payee_id: UserId,
}

/// Body for a settle call; "nothing to settle" is a successful, empty outcome.
pub fn settle_outcome_json(outcome: &SettleOutcome) -> Value {
    match outcome {
        SettleOutcome::Settled(record) => json!({
            "message": "settlement recorded",
            "settled": record.amount,
            "remaining": 0,
            "settlement": record,
        }),
        SettleOutcome::NothingToSettle => json!({
            "message": "no balance to settle",
            "settled": 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    #[test]
    fn create_expense_request_accepts_share_wise_alias() {
        let body = json!({
            "amount": 100.0,
            "split_type": "share-wise",
            "created_by": 1,
            "group_id": 4,
            "contributors": [
                {"user_id": 1, "paid_amount": 100.0, "share": 1.0},
                {"user_id": 2, "paid_amount": 0.0, "share": 3.0}
            ]
        });
        let req: CreateExpenseRequest = serde_json::from_value(body).unwrap();
        let (expense, contributors) = req.into_parts().unwrap();

        assert_eq!(expense.policy, SplitPolicy::Share);
        assert_eq!(expense.group_id, Some(GroupId::new(4)));
        assert_eq!(contributors[1].share, Some(3.0));
    }

    #[test]
    fn unknown_split_type_is_a_bad_request() {
        let req = CreateExpenseRequest {
            amount: 10.0,
            split_type: "random".to_string(),
            description: String::new(),
            created_by: UserId::new(1),
            group_id: None,
            contributors: vec![],
        };
        let response = req.into_parts().unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn member_request_reads_camel_case_and_snake_case() {
        let camel: GroupMemberRequest =
            serde_json::from_value(json!({"groupId": 3, "userId": 8})).unwrap();
        let snake: GroupMemberRequest =
            serde_json::from_value(json!({"group_id": 3, "user_id": 8})).unwrap();

        assert_eq!(camel.group_id, GroupId::new(3));
        assert_eq!(snake.user_id, UserId::new(8));
    }

    #[test]
    fn nothing_to_settle_reports_zero() {
        let body = settle_outcome_json(&SettleOutcome::NothingToSettle);
        assert_eq!(body["settled"], 0);
        assert!(body.get("settlement").is_none());
    }
}
