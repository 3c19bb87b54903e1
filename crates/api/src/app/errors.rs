use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use splitledger_core::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let status = match &err {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        LedgerError::UnbalancedLedger { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, code = err.code(), "ledger request failed");
    }
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use splitledger_core::{GroupId, UserId};

    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (LedgerError::EmptyContributorSet, StatusCode::BAD_REQUEST),
            (
                LedgerError::SplitSumMismatch {
                    expected: 100.0,
                    actual: 90.0,
                },
                StatusCode::BAD_REQUEST,
            ),
            (LedgerError::UnbalancedLedger { total: 5.0 }, StatusCode::CONFLICT),
            (LedgerError::GroupNotFound(GroupId::new(4)), StatusCode::NOT_FOUND),
            (
                LedgerError::MemberNotFound {
                    group_id: GroupId::new(4),
                    user_id: UserId::new(1),
                },
                StatusCode::NOT_FOUND,
            ),
            (LedgerError::aggregation("timeout"), StatusCode::INTERNAL_SERVER_ERROR),
            (LedgerError::store("down"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ledger_error_to_response(err).status(), expected);
        }
    }
}
