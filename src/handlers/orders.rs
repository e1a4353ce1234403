//! HTTP surface for store orders.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::models::{CreateOrder, OrderWithItems, StoreOrder};
use crate::orders;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}/cancel", post(cancel_order))
}

/// Place an order: stock is checked and reserved here, not at payment time.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrder>,
) -> Result<(StatusCode, Json<OrderWithItems>)> {
    let mut conn = state.db.get()?;
    let order = orders::create_order(&mut conn, &request)?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Staff cancels an order, restoring its reserved stock.
async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoreOrder>> {
    let mut conn = state.db.get()?;
    let order = orders::cancel_order(&mut conn, &id)?;
    Ok(Json(order))
}
