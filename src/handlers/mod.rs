pub mod gateway;
pub mod orders;
pub mod payments;

use axum::routing::get;
use axum::Router;

use crate::db::AppState;

async fn health() -> &'static str {
    "ok"
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(payments::router())
        .merge(gateway::router())
        .merge(orders::router())
}
