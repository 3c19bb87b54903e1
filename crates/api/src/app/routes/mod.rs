use axum::Router;

pub mod expenses;
pub mod groups;
pub mod personal;
pub mod settlements;
pub mod system;

/// Router for every ledger endpoint (mounted under `/api`).
pub fn router() -> Router {
    Router::new()
        .merge(expenses::router())
        .nest("/group", groups::router())
        .nest("/users", personal::router())
        .nest("/settle", settlements::router())
}
