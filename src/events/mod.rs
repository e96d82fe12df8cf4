//! Internal event bus. One event per creation or terminal transition,
//! at-least-once; consumers (catalog refresh, order history) key their
//! idempotence on `(order_id, kind)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventKind {
    #[serde(rename = "order.created")]
    Created,
    #[serde(rename = "order.completed")]
    Completed,
    #[serde(rename = "order.cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub kind: OrderEventKind,
    pub order_id: Uuid,
    pub ticket_id: Uuid,
    /// Ticket version after the transition landed.
    pub ticket_version: u64,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EventNotifier {
    tx: broadcast::Sender<OrderEvent>,
}

impl EventNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    /// Publish never fails a transition: with no subscribers the send result
    /// is ignored, and lagging subscribers drop the oldest events (they must
    /// be idempotent anyway).
    pub fn publish(&self, kind: OrderEventKind, order_id: Uuid, ticket_id: Uuid, ticket_version: u64) {
        let event = OrderEvent {
            kind,
            order_id,
            ticket_id,
            ticket_version,
            at: Utc::now(),
        };
        info!(?kind, %order_id, %ticket_id, ticket_version, "publishing order event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}
