//! Expiration Scheduler: a time-ordered queue of pending expiries drained by
//! one dedicated task. Delivery is at-least-once; the order state machine's
//! no-op handling of late or duplicate `expire` calls makes that safe.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::orders::OrderService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DueEntry {
    due: DateTime<Utc>,
    order_id: Uuid,
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.order_id.cmp(&other.order_id))
    }
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

enum NextAction {
    /// An entry is due now.
    Fire(Uuid),
    /// Sleep until the earliest entry comes due (or a new one is pushed).
    WaitUntil(DateTime<Utc>),
    /// Queue is empty.
    Idle,
}

#[derive(Default)]
pub struct ExpirationScheduler {
    queue: Mutex<BinaryHeap<Reverse<DueEntry>>>,
    notify: Notify,
}

impl ExpirationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a one-shot expiry for `order_id`. Wakes the drain task in
    /// case the new entry is due earlier than everything already queued.
    pub fn schedule(&self, order_id: Uuid, due: DateTime<Utc>) {
        self.queue
            .lock()
            .unwrap()
            .push(Reverse(DueEntry { due, order_id }));
        debug!(%order_id, %due, "expiry scheduled");
        self.notify.notify_one();
    }

    /// Re-arms timers for every pending order. Run once at startup so no
    /// reservation dangles because its timer died with the process; overdue
    /// entries fire immediately.
    pub fn recover(&self, orders: &OrderService) {
        let pending = orders.created_orders();
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "re-arming expiry timers for pending orders");
        for (order_id, expires_at) in pending {
            self.schedule(order_id, expires_at);
        }
    }

    fn next_action(&self, now: DateTime<Utc>) -> NextAction {
        let mut queue = self.queue.lock().unwrap();
        match queue.peek() {
            Some(Reverse(entry)) if entry.due <= now => {
                let entry = queue.pop().unwrap().0;
                NextAction::Fire(entry.order_id)
            }
            Some(Reverse(entry)) => NextAction::WaitUntil(entry.due),
            None => NextAction::Idle,
        }
    }

    /// Drain loop. Spawned once; never returns.
    pub async fn run(self: Arc<Self>, orders: Arc<OrderService>) {
        loop {
            match self.next_action(Utc::now()) {
                NextAction::Fire(order_id) => {
                    match orders.expire(order_id).await {
                        Ok(Some(_)) => info!(%order_id, "order expired"),
                        // Already paid or cancelled: the expected race, absorbed.
                        Ok(None) => debug!(%order_id, "expiry no-op, order already terminal"),
                        Err(e) => warn!(%order_id, "expiry failed: {e}"),
                    }
                }
                NextAction::WaitUntil(due) => {
                    let delay = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                NextAction::Idle => self.notify.notified().await,
            }
        }
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}
