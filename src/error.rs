use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy of the reservation core.
///
/// `Conflict`, `Expired` and `Declined` are normal user-facing outcomes.
/// `NotHeld` is an internal invariant violation and should be unreachable;
/// it is logged as a defect wherever it surfaces.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Ticket already held by another pending order, or concurrently modified.
    #[error("ticket is no longer available")]
    Conflict,

    /// Confirm attempted by an order that does not hold the ticket.
    #[error("order {order_id} does not hold ticket {ticket_id}")]
    NotHeld { ticket_id: Uuid, order_id: Uuid },

    /// Order is past its reservation window (or already cancelled).
    #[error("order expired, start over")]
    Expired,

    /// Payment rejected by the provider. The order stays pending and the
    /// buyer may retry until the window closes.
    #[error("payment declined: {reason}")]
    Declined { reason: String },

    /// Transient provider failure (network, timeout, circuit open). Distinct
    /// from `Declined` so the UI never claims "card declined" for an outage.
    #[error("payment provider error: {0}")]
    Provider(String),

    #[error("ticket {0} not found")]
    TicketNotFound(Uuid),

    #[error("order {0} not found")]
    OrderNotFound(Uuid),
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Conflict => StatusCode::CONFLICT,
            CoreError::Expired => StatusCode::GONE,
            CoreError::Declined { .. } => StatusCode::PAYMENT_REQUIRED,
            CoreError::Provider(_) => StatusCode::BAD_GATEWAY,
            CoreError::TicketNotFound(_) | CoreError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::NotHeld { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
