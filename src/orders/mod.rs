//! Order State Machine. One purchase attempt per order:
//! `Created` -> `Complete` (paid) or `Created` -> `Cancelled` (expired or
//! administratively cancelled), nothing else. Transitions on a single order
//! are serialized through a per-order async mutex because `pay` and `expire`
//! can race from different tasks; whichever reaches the mutex first decides
//! the terminal state and the loser observes a no-op.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;
use uuid::Uuid;

use crate::config::ReservationConfig;
use crate::error::CoreError;
use crate::events::{EventNotifier, OrderEventKind};
use crate::ledger::TicketLedger;
use crate::models::{Order, OrderStatus};
use crate::payment::{ChargeOutcome, PaymentAdapter};
use crate::scheduler::ExpirationScheduler;

struct OrderSlot {
    order: Order,
    /// Serializes `pay` against `expire`/`cancel` for this order.
    lock: Arc<AsyncMutex<()>>,
}

pub struct OrderService {
    reservation: ReservationConfig,
    ledger: Arc<TicketLedger>,
    payment: Arc<dyn PaymentAdapter>,
    scheduler: Arc<ExpirationScheduler>,
    notifier: EventNotifier,
    orders: RwLock<HashMap<Uuid, OrderSlot>>,
}

impl OrderService {
    pub fn new(
        reservation: ReservationConfig,
        ledger: Arc<TicketLedger>,
        payment: Arc<dyn PaymentAdapter>,
        scheduler: Arc<ExpirationScheduler>,
        notifier: EventNotifier,
    ) -> Self {
        Self {
            reservation,
            ledger,
            payment,
            scheduler,
            notifier,
            orders: RwLock::new(HashMap::new()),
        }
    }

    /// Reserves the ticket and, on success, creates the order and arms its
    /// expiry timer. A `Conflict` from the ledger propagates untouched: the
    /// ticket is already held or was concurrently modified.
    pub fn create(
        &self,
        ticket_id: Uuid,
        buyer_id: &str,
        expected_version: Option<u64>,
    ) -> Result<Order, CoreError> {
        let ticket = self.ledger.get(ticket_id)?;
        let window = self.reservation.window_for(ticket.category);

        let order = Order::new(ticket_id, buyer_id, Utc::now(), window);
        let reservation = self.ledger.reserve(ticket_id, order.id, expected_version)?;

        self.orders.write().unwrap().insert(
            order.id,
            OrderSlot {
                order: order.clone(),
                lock: Arc::new(AsyncMutex::new(())),
            },
        );
        self.scheduler.schedule(order.id, order.expires_at);
        self.notifier.publish(
            OrderEventKind::Created,
            order.id,
            ticket_id,
            reservation.version,
        );
        info!(order_id = %order.id, %ticket_id, buyer_id, expires_at = %order.expires_at, "order created");
        Ok(order)
    }

    /// Attempts payment. Valid only while `Created` and before the stored
    /// `expires_at` — the countdown a client renders is advisory and never
    /// consulted. The per-order lock is held across the charge, so an armed
    /// expiry timer waits for the charge's definite outcome before it can
    /// observe the order.
    pub async fn pay(&self, order_id: Uuid, token: &str) -> Result<Order, CoreError> {
        let lock = self.slot_lock(order_id)?;
        let _guard = lock.lock().await;

        let order = self.snapshot(order_id)?;
        match order.status {
            // Retried pay after success (at-least-once clients): idempotent.
            OrderStatus::Complete => return Ok(order),
            OrderStatus::Cancelled => return Err(CoreError::Expired),
            OrderStatus::Created => {}
        }
        if Utc::now() >= order.expires_at {
            // Past the window; the scheduler owns the cancellation.
            return Err(CoreError::Expired);
        }

        let amount = self.ledger.get(order.ticket_id)?.price;
        let receipt_id = match self
            .payment
            .charge(&order, amount, token)
            .await
            .map_err(|e| CoreError::Provider(e.to_string()))?
        {
            ChargeOutcome::Approved { receipt_id } => receipt_id,
            ChargeOutcome::Declined { reason } => {
                info!(%order_id, %reason, "payment declined, order stays pending");
                return Err(CoreError::Declined { reason });
            }
        };

        let ticket_version = self.ledger.confirm(order.ticket_id, order_id)?;
        let updated = self.update(order_id, |o| {
            o.status = OrderStatus::Complete;
            o.receipt_id = Some(receipt_id.clone());
            o.version += 1;
        })?;
        self.notifier.publish(
            OrderEventKind::Completed,
            order_id,
            order.ticket_id,
            ticket_version,
        );
        info!(%order_id, %receipt_id, "order complete");
        Ok(updated)
    }

    /// Scheduler-driven expiry. Returns `Ok(None)` when the order already
    /// left `Created`: the expected race with a last-moment payment, absorbed
    /// as a no-op by design.
    pub async fn expire(&self, order_id: Uuid) -> Result<Option<Order>, CoreError> {
        self.cancel_pending(order_id, "expired").await
    }

    /// Administrative cancellation (e.g. the seller pulls the ticket). Same
    /// effect and same no-op semantics as `expire`.
    pub async fn cancel(&self, order_id: Uuid) -> Result<Option<Order>, CoreError> {
        self.cancel_pending(order_id, "cancelled").await
    }

    async fn cancel_pending(
        &self,
        order_id: Uuid,
        cause: &str,
    ) -> Result<Option<Order>, CoreError> {
        let lock = self.slot_lock(order_id)?;
        let _guard = lock.lock().await;

        let order = self.snapshot(order_id)?;
        if order.status.is_terminal() {
            return Ok(None);
        }

        let ticket_version = self.ledger.release(order.ticket_id, order_id)?;
        let updated = self.update(order_id, |o| {
            o.status = OrderStatus::Cancelled;
            o.version += 1;
        })?;
        self.notifier.publish(
            OrderEventKind::Cancelled,
            order_id,
            order.ticket_id,
            ticket_version,
        );
        info!(%order_id, cause, "order cancelled, hold released");
        Ok(Some(updated))
    }

    pub fn get(&self, order_id: Uuid) -> Result<Order, CoreError> {
        self.snapshot(order_id)
    }

    pub fn list_for_buyer(&self, buyer_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .unwrap()
            .values()
            .filter(|slot| slot.order.buyer_id == buyer_id)
            .map(|slot| slot.order.clone())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// Pending orders and their due times, for the scheduler's recovery scan.
    pub fn created_orders(&self) -> Vec<(Uuid, DateTime<Utc>)> {
        self.orders
            .read()
            .unwrap()
            .values()
            .filter(|slot| slot.order.status == OrderStatus::Created)
            .map(|slot| (slot.order.id, slot.order.expires_at))
            .collect()
    }

    fn slot_lock(&self, order_id: Uuid) -> Result<Arc<AsyncMutex<()>>, CoreError> {
        self.orders
            .read()
            .unwrap()
            .get(&order_id)
            .map(|slot| slot.lock.clone())
            .ok_or(CoreError::OrderNotFound(order_id))
    }

    fn snapshot(&self, order_id: Uuid) -> Result<Order, CoreError> {
        self.orders
            .read()
            .unwrap()
            .get(&order_id)
            .map(|slot| slot.order.clone())
            .ok_or(CoreError::OrderNotFound(order_id))
    }

    fn update(&self, order_id: Uuid, apply: impl FnOnce(&mut Order)) -> Result<Order, CoreError> {
        let mut orders = self.orders.write().unwrap();
        let slot = orders
            .get_mut(&order_id)
            .ok_or(CoreError::OrderNotFound(order_id))?;
        apply(&mut slot.order);
        Ok(slot.order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{Category, Ticket};
    use crate::payment::ProviderError;
    use async_trait::async_trait;
    use futures::future::join;
    use rust_decimal::Decimal;
    use std::time::Duration;

    struct Approve;
    #[async_trait]
    impl PaymentAdapter for Approve {
        async fn charge(
            &self,
            _order: &Order,
            _amount: Decimal,
            _token: &str,
        ) -> Result<ChargeOutcome, ProviderError> {
            Ok(ChargeOutcome::Approved { receipt_id: "rcpt-1".to_string() })
        }
    }

    struct Decline;
    #[async_trait]
    impl PaymentAdapter for Decline {
        async fn charge(
            &self,
            _order: &Order,
            _amount: Decimal,
            _token: &str,
        ) -> Result<ChargeOutcome, ProviderError> {
            Ok(ChargeOutcome::Declined { reason: "insufficient funds".to_string() })
        }
    }

    struct Outage;
    #[async_trait]
    impl PaymentAdapter for Outage {
        async fn charge(
            &self,
            _order: &Order,
            _amount: Decimal,
            _token: &str,
        ) -> Result<ChargeOutcome, ProviderError> {
            Err(ProviderError::Unavailable("gateway down".to_string()))
        }
    }

    /// Approves after a delay, to widen the pay/expire race window.
    struct SlowApprove(Duration);
    #[async_trait]
    impl PaymentAdapter for SlowApprove {
        async fn charge(
            &self,
            _order: &Order,
            _amount: Decimal,
            _token: &str,
        ) -> Result<ChargeOutcome, ProviderError> {
            tokio::time::sleep(self.0).await;
            Ok(ChargeOutcome::Approved { receipt_id: "rcpt-slow".to_string() })
        }
    }

    struct Fixture {
        service: Arc<OrderService>,
        ledger: Arc<TicketLedger>,
        scheduler: Arc<ExpirationScheduler>,
        notifier: EventNotifier,
        ticket_id: Uuid,
    }

    fn fixture(window_secs: u64, adapter: Arc<dyn PaymentAdapter>) -> Fixture {
        let mut cfg = Config::for_tests();
        cfg.reservation.window_secs = window_secs;

        let ledger = Arc::new(TicketLedger::new());
        let ticket_id = ledger.insert(Ticket::new(
            "T1",
            Decimal::new(5000, 2),
            Category::Concerts,
        ));
        let scheduler = Arc::new(ExpirationScheduler::new());
        let notifier = EventNotifier::default();
        let service = Arc::new(OrderService::new(
            cfg.reservation,
            ledger.clone(),
            adapter,
            scheduler.clone(),
            notifier.clone(),
        ));
        Fixture { service, ledger, scheduler, notifier, ticket_id }
    }

    #[tokio::test]
    async fn create_holds_ticket_and_sets_window() {
        let f = fixture(900, Arc::new(Approve));
        let mut rx = f.notifier.subscribe();

        let order = f.service.create(f.ticket_id, "B1", None).unwrap();
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.expires_at, order.created_at + chrono::Duration::seconds(900));

        let ticket = f.ledger.get(f.ticket_id).unwrap();
        assert_eq!(ticket.reserving_order_id, Some(order.id));
        assert_eq!(ticket.version, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, OrderEventKind::Created);
        assert_eq!(event.ticket_version, 1);
    }

    #[tokio::test]
    async fn second_buyer_gets_conflict_while_first_holds() {
        let f = fixture(900, Arc::new(Approve));
        f.service.create(f.ticket_id, "B1", None).unwrap();

        let err = f.service.create(f.ticket_id, "B2", None).unwrap_err();
        assert!(matches!(err, CoreError::Conflict));
    }

    #[tokio::test]
    async fn pay_within_window_completes_and_sells_ticket() {
        let f = fixture(900, Arc::new(Approve));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        let paid = f.service.pay(order.id, "tok_visa").await.unwrap();
        assert_eq!(paid.status, OrderStatus::Complete);
        assert_eq!(paid.receipt_id.as_deref(), Some("rcpt-1"));

        let ticket = f.ledger.get(f.ticket_id).unwrap();
        assert_eq!(ticket.sold_order_id, Some(order.id));
        assert!(ticket.reserving_order_id.is_none());

        // The originally armed timer still fires; it must be a no-op.
        let expired = f.service.expire(order.id).await.unwrap();
        assert!(expired.is_none());
        assert_eq!(f.service.get(order.id).unwrap().status, OrderStatus::Complete);
    }

    #[tokio::test]
    async fn pay_past_window_is_expired() {
        let f = fixture(0, Arc::new(Approve));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        let err = f.service.pay(order.id, "tok_visa").await.unwrap_err();
        assert!(matches!(err, CoreError::Expired));
        // Not cancelled by pay: the scheduler owns that transition.
        assert_eq!(f.service.get(order.id).unwrap().status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn declined_payment_keeps_order_pending_and_is_retryable() {
        let f = fixture(900, Arc::new(Decline));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        let err = f.service.pay(order.id, "tok_visa").await.unwrap_err();
        assert!(matches!(err, CoreError::Declined { .. }));
        assert_eq!(f.service.get(order.id).unwrap().status, OrderStatus::Created);
        assert_eq!(
            f.ledger.get(f.ticket_id).unwrap().reserving_order_id,
            Some(order.id)
        );
    }

    #[tokio::test]
    async fn provider_error_is_not_declined_and_not_cancelled() {
        let f = fixture(900, Arc::new(Outage));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        let err = f.service.pay(order.id, "tok_visa").await.unwrap_err();
        assert!(matches!(err, CoreError::Provider(_)));
        assert_eq!(f.service.get(order.id).unwrap().status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn expire_releases_ticket_with_single_version_bump() {
        let f = fixture(900, Arc::new(Approve));
        let mut rx = f.notifier.subscribe();
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();
        rx.recv().await.unwrap(); // order.created

        let cancelled = f.service.expire(order.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let ticket = f.ledger.get(f.ticket_id).unwrap();
        assert!(ticket.reserving_order_id.is_none());
        // reserve bumped to 1, release to 2 — exactly one bump for the expiry.
        assert_eq!(ticket.version, 2);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, OrderEventKind::Cancelled);
        assert_eq!(event.ticket_version, 2);

        // Second expiry delivery: no-op, no further event, no version bump.
        assert!(f.service.expire(order.id).await.unwrap().is_none());
        assert_eq!(f.ledger.get(f.ticket_id).unwrap().version, 2);
    }

    #[tokio::test]
    async fn pay_after_cancellation_is_expired() {
        let f = fixture(900, Arc::new(Approve));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();
        f.service.cancel(order.id).await.unwrap();

        let err = f.service.pay(order.id, "tok_visa").await.unwrap_err();
        assert!(matches!(err, CoreError::Expired));
    }

    #[tokio::test]
    async fn pay_retry_after_success_is_idempotent() {
        let f = fixture(900, Arc::new(Approve));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        let first = f.service.pay(order.id, "tok_visa").await.unwrap();
        let second = f.service.pay(order.id, "tok_visa").await.unwrap();
        assert_eq!(first.status, OrderStatus::Complete);
        assert_eq!(second.version, first.version);
    }

    #[tokio::test]
    async fn pay_and_expire_race_yields_exactly_one_terminal_state() {
        let f = fixture(900, Arc::new(SlowApprove(Duration::from_millis(20))));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        let pay_service = f.service.clone();
        let expire_service = f.service.clone();
        let (pay_result, expire_result) = join(
            tokio::spawn(async move { pay_service.pay(order.id, "tok_visa").await }),
            tokio::spawn(async move { expire_service.expire(order.id).await }),
        )
        .await;
        let pay_result = pay_result.unwrap();
        let expire_result = expire_result.unwrap();

        let final_order = f.service.get(order.id).unwrap();
        let ticket = f.ledger.get(f.ticket_id).unwrap();
        match final_order.status {
            OrderStatus::Complete => {
                // Pay won the per-order lock; expiry observed a no-op.
                assert!(pay_result.is_ok());
                assert!(matches!(expire_result, Ok(None)));
                assert_eq!(ticket.sold_order_id, Some(order.id));
            }
            OrderStatus::Cancelled => {
                // Expiry won; pay found the order gone.
                assert!(matches!(pay_result, Err(CoreError::Expired)));
                assert!(matches!(expire_result, Ok(Some(_))));
                assert!(ticket.is_available());
            }
            OrderStatus::Created => panic!("order must reach a terminal state"),
        }
    }

    #[tokio::test]
    async fn drain_task_cancels_overdue_order() {
        let f = fixture(0, Arc::new(Approve));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        tokio::spawn(f.scheduler.clone().run(f.service.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(f.service.get(order.id).unwrap().status, OrderStatus::Cancelled);
        assert!(f.ledger.get(f.ticket_id).unwrap().is_available());
    }

    #[tokio::test]
    async fn recovery_scan_rearms_lost_timers() {
        let f = fixture(0, Arc::new(Approve));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        // Simulate a restart: a fresh scheduler that never saw the order.
        let fresh = Arc::new(ExpirationScheduler::new());
        fresh.recover(&f.service);
        tokio::spawn(fresh.run(f.service.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(f.service.get(order.id).unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn buyer_order_listing_filters_by_buyer() {
        let f = fixture(900, Arc::new(Approve));
        let order = f.service.create(f.ticket_id, "B1", None).unwrap();

        assert_eq!(f.service.list_for_buyer("B1").len(), 1);
        assert!(f.service.list_for_buyer("B2").is_empty());
        assert_eq!(f.service.list_for_buyer("B1")[0].id, order.id);
    }
}
