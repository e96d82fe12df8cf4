pub mod config;
pub mod controllers;
pub mod error;
pub mod events;
pub mod ledger;
pub mod models;
pub mod orders;
pub mod payment;
pub mod scheduler;

use std::sync::Arc;

use crate::events::EventNotifier;
use crate::ledger::TicketLedger;
use crate::orders::OrderService;
use crate::payment::gateway::PaymentGatewayClient;
use crate::payment::PaymentAdapter;
use crate::scheduler::ExpirationScheduler;

// Shared state for the whole application.
pub struct AppState {
    pub config: config::Config,
    pub ledger: Arc<TicketLedger>,
    pub orders: Arc<OrderService>,
    pub scheduler: Arc<ExpirationScheduler>,
    pub notifier: EventNotifier,
}

impl AppState {
    /// State wired to the real HTTP payment gateway.
    pub fn new(config: config::Config) -> Arc<Self> {
        let payment = Arc::new(PaymentGatewayClient::from_config(
            &config.payment,
            &config.circuit_breaker,
        ));
        Self::with_payment_adapter(config, payment)
    }

    /// State with a caller-supplied payment adapter (tests, local runs).
    pub fn with_payment_adapter(
        config: config::Config,
        payment: Arc<dyn PaymentAdapter>,
    ) -> Arc<Self> {
        let ledger = Arc::new(TicketLedger::new());
        let scheduler = Arc::new(ExpirationScheduler::new());
        let notifier = EventNotifier::default();
        let orders = Arc::new(OrderService::new(
            config.reservation.clone(),
            ledger.clone(),
            payment,
            scheduler.clone(),
            notifier.clone(),
        ));

        Arc::new(Self {
            config,
            ledger,
            orders,
            scheduler,
            notifier,
        })
    }

    /// Re-arm expiry timers and start the drain task. Call once at startup,
    /// after any persisted orders have been loaded.
    pub fn start_expiration_worker(self: &Arc<Self>) {
        self.scheduler.recover(&self.orders);
        tokio::spawn(self.scheduler.clone().run(self.orders.clone()));
    }
}
