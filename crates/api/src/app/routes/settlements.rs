use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use splitledger_core::{GroupId, UserId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/personal", post(settle_personal))
        .route("/:group_id/group/:user1_id/:user2_id", post(settle_group_pair))
}

pub async fn settle_personal(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SettlePersonalRequest>,
) -> axum::response::Response {
    match services.settle_personal(body.payer_id, body.payee_id).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::settle_outcome_json(&outcome))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn settle_group_pair(
    Extension(services): Extension<Arc<AppServices>>,
    Path((group_id, user1, user2)): Path<(GroupId, UserId, UserId)>,
) -> axum::response::Response {
    match services.settle_group_pair(group_id, user1, user2).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::settle_outcome_json(&outcome))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
