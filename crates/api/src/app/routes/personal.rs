use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use splitledger_core::UserId;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:user_id/balance/:counterpart_id", get(get_personal_balance))
}

/// Raw per-expense debts between two users plus their net position.
pub async fn get_personal_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path((user_id, counterpart_id)): Path<(UserId, UserId)>,
) -> axum::response::Response {
    match services.personal_balance(user_id, counterpart_id).await {
        Ok(balance) => (StatusCode::OK, Json(balance)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
