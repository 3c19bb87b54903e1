use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use splitledger_core::{GroupId, LedgerResult, UserId};

use splitledger_ledger::{Group, NewGroup};

use crate::app::dto::GroupMemberRequest;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_group))
        .route("/addUser", post(add_user))
        .route("/removeUser", post(remove_user))
        .route("/:group_id", get(get_group))
        .route("/:group_id/balances", get(get_group_balances))
        .route("/:group_id/balances/:user_id", get(get_user_group_balance))
        .route("/:group_id/expenses", get(get_group_expenses))
}

pub async fn create_group(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<NewGroup>,
) -> axum::response::Response {
    match services.create_group(req).await {
        Ok(group) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Group created successfully",
                "group_id": group.id,
                "group": group,
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_group(
    Extension(services): Extension<Arc<AppServices>>,
    Path(group_id): Path<GroupId>,
) -> axum::response::Response {
    match services.group(group_id).await {
        Ok(group) => (StatusCode::OK, Json(group)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn add_user(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<GroupMemberRequest>,
) -> axum::response::Response {
    let result = services.add_member(req.group_id, req.user_id).await;
    membership_response(result, "User added to group successfully")
}

pub async fn remove_user(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<GroupMemberRequest>,
) -> axum::response::Response {
    let result = services.remove_member(req.group_id, req.user_id).await;
    membership_response(result, "User removed from group successfully")
}

fn membership_response(
    result: LedgerResult<Group>,
    message: &str,
) -> axum::response::Response {
    match result {
        Ok(group) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": message, "group": group })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Transfers that settle the whole group, as `[{from, to, amount}]`.
pub async fn get_group_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Path(group_id): Path<GroupId>,
) -> axum::response::Response {
    match services.group_settlement_plan(group_id).await {
        Ok(plan) => (StatusCode::OK, Json(plan.transfers)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_user_group_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> axum::response::Response {
    let balance = match services.user_group_balance(group_id, user_id).await {
        Ok(b) => b,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "group_id": balance.group_id,
            "user_balance": balance.summary,
            "user_settlements": balance.transfers,
        })),
    )
        .into_response()
}

pub async fn get_group_expenses(
    Extension(services): Extension<Arc<AppServices>>,
    Path(group_id): Path<GroupId>,
) -> axum::response::Response {
    match services.group_expenses(group_id).await {
        Ok(expenses) => (StatusCode::OK, Json(expenses)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
