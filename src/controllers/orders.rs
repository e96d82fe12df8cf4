use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::controllers::error_response;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/pay", post(pay_order))
        .route("/orders/{id}/cancel", post(cancel_order))
}

// GET /api/orders?buyerId=
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListOrdersQuery {
    buyer_id: String,
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> impl IntoResponse {
    Json(state.orders.list_for_buyer(&query.buyer_id))
}

// GET /api/orders/{id}
// The client derives its advisory countdown from the returned expiresAt.
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let order = state.orders.get(id).map_err(error_response)?;
    Ok(Json(order))
}

// POST /api/orders/{id}/pay
#[derive(Debug, Deserialize)]
struct PayRequest {
    token: String,
}

async fn pay_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<PayRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let order = state.orders.pay(id, &req.token).await.map_err(error_response)?;
    Ok(Json(order))
}

// POST /api/orders/{id}/cancel — administrative path, same semantics as
// expiry. Cancelling an already terminal order returns its snapshot.
async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    match state.orders.cancel(id).await.map_err(error_response)? {
        Some(order) => Ok(Json(order)),
        None => {
            let order = state.orders.get(id).map_err(error_response)?;
            Ok(Json(order))
        }
    }
}
