use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::controllers::error_response;
use crate::models::{Category, Ticket};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tickets", get(list_tickets))
        .route("/tickets", post(create_ticket))
        .route("/tickets/{id}", get(get_ticket))
        .route("/tickets/{id}/reserve", post(reserve_ticket))
}

// GET /api/tickets
async fn list_tickets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.ledger.list())
}

// POST /api/tickets
#[derive(Debug, Deserialize)]
struct CreateTicketRequest {
    title: String,
    price: Decimal,
    category: Category,
}

async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if req.title.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "title must not be empty" })),
        ));
    }
    if req.price <= Decimal::ZERO {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "price must be positive" })),
        ));
    }

    let ticket = Ticket::new(req.title, req.price.round_dp(2), req.category);
    state.ledger.insert(ticket.clone());
    Ok((StatusCode::CREATED, Json(ticket)))
}

// GET /api/tickets/{id}
async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let ticket = state.ledger.get(id).map_err(error_response)?;
    Ok(Json(ticket))
}

// POST /api/tickets/{id}/reserve
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveRequest {
    buyer_id: String,
    /// Last ticket version the client observed; omit to reserve only a
    /// currently free ticket.
    expected_version: Option<u64>,
}

async fn reserve_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReserveRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let order = state
        .orders
        .create(id, &req.buyer_id, req.expected_version)
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(order)))
}
