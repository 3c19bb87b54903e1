use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use splitledger_core::ExpenseId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/expense", post(create_expense))
        .route("/expense/:expense_id/contributions", get(get_contributions))
}

pub async fn create_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateExpenseRequest>,
) -> axum::response::Response {
    let (expense, contributors) = match body.into_parts() {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let detail = match services.add_expense(expense, contributors).await {
        Ok(d) => d,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "expense added",
            "expense_id": detail.expense.id,
            "expense": detail,
        })),
    )
        .into_response()
}

pub async fn get_contributions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(expense_id): Path<ExpenseId>,
) -> axum::response::Response {
    match services.expense_contributions(expense_id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
