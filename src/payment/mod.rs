//! Payment Adapter boundary. The core only ever talks to this trait; the
//! concrete provider (HTTP gateway, test double) is an external collaborator.

pub mod gateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::Order;

/// Definite outcome of a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { receipt_id: String },
    /// Normal, buyer-retryable rejection. The order stays pending.
    Declined { reason: String },
}

/// Transient provider failure. Never completes and never cancels an order;
/// only the scheduler cancels, via expiry.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
    #[error("payment gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Attempt to charge `amount` for `order` using the buyer-supplied
    /// `token`. Must run to a definite outcome; the caller holds the order
    /// serialized for the duration.
    async fn charge(
        &self,
        order: &Order,
        amount: Decimal,
        token: &str,
    ) -> Result<ChargeOutcome, ProviderError>;
}
