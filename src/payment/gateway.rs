//! HTTP payment gateway client. All network calls go through a circuit
//! breaker so a dead provider degrades to fast `ProviderError`s instead of a
//! pile-up of 30s timeouts.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerConfig, PaymentConfig};
use crate::models::Order;
use crate::payment::{ChargeOutcome, PaymentAdapter, ProviderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests allowed.
    Closed,
    /// Blocking requests after repeated failures.
    Open,
    /// One probe request allowed after the cool-down.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    last_failure: Mutex<Option<Instant>>,
    failure_threshold: u32,
    cool_down: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cool_down_secs: u64) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            last_failure: Mutex::new(None),
            failure_threshold,
            cool_down: Duration::from_secs(cool_down_secs),
        }
    }

    pub fn can_execute(&self) -> bool {
        let state = *self.state.read().unwrap();
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = self
                    .last_failure
                    .lock()
                    .unwrap()
                    .map(|t| t.elapsed() >= self.cool_down)
                    .unwrap_or(true);
                if cooled {
                    *self.state.write().unwrap() = CircuitState::HalfOpen;
                    info!("circuit breaker transitioning to HalfOpen");
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();
        if *state == CircuitState::HalfOpen {
            info!("circuit breaker recovered, closing");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_failure.lock().unwrap() = Some(Instant::now());

        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed if failures >= self.failure_threshold => {
                *state = CircuitState::Open;
                error!(failures, threshold = self.failure_threshold, "circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                warn!("circuit breaker probe failed, reopening");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeRequest {
    merchant_id: String,
    /// SHA-256 request signature.
    signature: String,
    /// Amount in minor units.
    amount: i64,
    currency: String,
    order_id: String,
    card_token: String,
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeResponse {
    approved: bool,
    receipt_id: Option<String>,
    message: Option<String>,
}

/// Production `PaymentAdapter`: talks to the configured HTTP gateway.
pub struct PaymentGatewayClient {
    merchant_id: String,
    password: String,
    base_url: String,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
}

impl PaymentGatewayClient {
    pub fn from_config(payment: &PaymentConfig, breaker: &CircuitBreakerConfig) -> Self {
        Self {
            merchant_id: payment.merchant_id.clone(),
            password: payment.merchant_password.clone(),
            base_url: payment.gateway_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(payment.charge_timeout_secs))
                .build()
                .expect("failed to build HTTP client"),
            circuit_breaker: CircuitBreaker::new(
                breaker.failure_threshold,
                breaker.timeout_seconds,
            ),
        }
    }

    /// Signature over the fields the gateway verifies, keyed by the merchant
    /// password.
    fn sign(&self, amount: i64, currency: &str, order_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!("{amount}{currency}{order_id}{}{}", self.password, self.merchant_id)
                .as_bytes(),
        );
        format!("{:x}", hasher.finalize())
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }
}

#[async_trait]
impl PaymentAdapter for PaymentGatewayClient {
    async fn charge(
        &self,
        order: &Order,
        amount: Decimal,
        token: &str,
    ) -> Result<ChargeOutcome, ProviderError> {
        if !self.circuit_breaker.can_execute() {
            warn!(order_id = %order.id, "circuit breaker open, blocking charge");
            return Err(ProviderError::Unavailable(
                "circuit breaker open".to_string(),
            ));
        }

        let currency = "USD";
        let minor = (amount * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| ProviderError::Unavailable("amount out of range".to_string()))?;
        let order_id = order.id.to_string();

        let request = ChargeRequest {
            merchant_id: self.merchant_id.clone(),
            signature: self.sign(minor, currency, &order_id),
            amount: minor,
            currency: currency.to_string(),
            order_id,
            card_token: token.to_string(),
            description: format!("ticket {}", order.ticket_id),
        };

        info!(order_id = %order.id, amount = minor, "charging via payment gateway");

        let result = async {
            self.http_client
                .post(format!("{}/api/v1/charges", self.base_url))
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<ChargeResponse>()
                .await
        }
        .await;

        let response = match result {
            Ok(response) => {
                self.circuit_breaker.record_success();
                response
            }
            Err(e) => {
                error!(order_id = %order.id, "payment gateway request failed: {e}");
                self.circuit_breaker.record_failure();
                return Err(ProviderError::Transport(e));
            }
        };

        if response.approved {
            let receipt_id = response.receipt_id.ok_or_else(|| {
                ProviderError::Unavailable("gateway approved without a receipt id".to_string())
            })?;
            Ok(ChargeOutcome::Approved { receipt_id })
        } else {
            Ok(ChargeOutcome::Declined {
                reason: response
                    .message
                    .unwrap_or_else(|| "declined by provider".to_string()),
            })
        }
    }
}
