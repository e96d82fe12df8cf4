use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Pending: the order holds its ticket and may still pay.
    Created,
    /// Terminal: paid and confirmed.
    Complete,
    /// Terminal: expired or administratively cancelled.
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    /// Immutable once created.
    pub ticket_id: Uuid,
    pub buyer_id: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// `created_at` + reservation window. Set exactly once; the authoritative
    /// expiry instant. Client countdowns derived from it are advisory only.
    pub expires_at: DateTime<Utc>,
    pub version: u64,
    /// Receipt from the payment provider, present once `Complete`.
    pub receipt_id: Option<String>,
}

impl Order {
    pub fn new(
        ticket_id: Uuid,
        buyer_id: impl Into<String>,
        created_at: DateTime<Utc>,
        window: std::time::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            buyer_id: buyer_id.into(),
            status: OrderStatus::Created,
            created_at,
            expires_at: created_at
                + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero()),
            version: 0,
            receipt_id: None,
        }
    }
}
