pub mod orders;
pub mod tickets;

use axum::http::StatusCode;
use axum::{Json, Router};
use std::sync::Arc;

use crate::error::CoreError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(tickets::routes())
        .merge(orders::routes())
}

/// Error shape shared by all handlers: the core taxonomy mapped to a status
/// code plus a JSON body the client can show.
pub(crate) fn error_response(e: CoreError) -> (StatusCode, Json<serde_json::Value>) {
    let status = e.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("internal invariant violation: {e}");
    }
    (
        status,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
}
