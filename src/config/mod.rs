use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::models::Category;

// Top-level configuration container, built once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub reservation: ReservationConfig,
    pub payment: PaymentConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Reservation window settings. The window is configurable globally and,
// optionally, per ticket category.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    pub window_secs: u64,
    pub concerts_window_secs: Option<u64>,
    pub sports_window_secs: Option<u64>,
    pub theater_window_secs: Option<u64>,
    pub conferences_window_secs: Option<u64>,
}

impl ReservationConfig {
    /// Window applied to a new order for a ticket of the given category.
    pub fn window_for(&self, category: Category) -> Duration {
        let secs = match category {
            Category::Concerts => self.concerts_window_secs,
            Category::Sports => self.sports_window_secs,
            Category::Theater => self.theater_window_secs,
            Category::Conferences => self.conferences_window_secs,
        }
        .unwrap_or(self.window_secs);
        Duration::from_secs(secs)
    }
}

// Payment gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub merchant_id: String,
    pub merchant_password: String,
    pub gateway_url: String,
    pub charge_timeout_secs: u64,
}

// Circuit breaker settings for the payment gateway client.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "ticket_marketplace=debug,tower_http=debug".to_string()),
            },
            reservation: ReservationConfig {
                window_secs: env::var("RESERVATION_WINDOW_SECS")
                    .unwrap_or_else(|_| "900".to_string())
                    .parse()
                    .expect("RESERVATION_WINDOW_SECS must be a valid number"),
                concerts_window_secs: optional_secs("RESERVATION_WINDOW_CONCERTS_SECS"),
                sports_window_secs: optional_secs("RESERVATION_WINDOW_SPORTS_SECS"),
                theater_window_secs: optional_secs("RESERVATION_WINDOW_THEATER_SECS"),
                conferences_window_secs: optional_secs("RESERVATION_WINDOW_CONFERENCES_SECS"),
            },
            payment: PaymentConfig {
                merchant_id: env::var("MERCHANT_ID").unwrap_or_else(|_| "marketplace".to_string()),
                merchant_password: env::var("MERCHANT_PASSWORD")
                    .unwrap_or_else(|_| "changeme".to_string()),
                gateway_url: env::var("PAYMENT_GATEWAY_URL")
                    .unwrap_or_else(|_| "https://gateway.example.com".to_string()),
                charge_timeout_secs: env::var("PAYMENT_CHARGE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .expect("PAYMENT_CHARGE_TIMEOUT_SECS must be a valid number"),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_FAILURE_THRESHOLD must be a valid number"),
                timeout_seconds: env::var("CIRCUIT_BREAKER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_TIMEOUT_SECONDS must be a valid number"),
            },
        }
    }

    /// Config with defaults only, no environment access. Used by tests.
    pub fn for_tests() -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
                rust_log: "ticket_marketplace=debug".to_string(),
            },
            reservation: ReservationConfig {
                window_secs: 900,
                concerts_window_secs: None,
                sports_window_secs: None,
                theater_window_secs: None,
                conferences_window_secs: None,
            },
            payment: PaymentConfig {
                merchant_id: "test-merchant".to_string(),
                merchant_password: "test-password".to_string(),
                gateway_url: "http://127.0.0.1:9".to_string(),
                charge_timeout_secs: 5,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                timeout_seconds: 60,
            },
        }
    }
}

fn optional_secs(var: &str) -> Option<u64> {
    env::var(var)
        .ok()
        .map(|v| v.parse().unwrap_or_else(|_| panic!("{var} must be a valid number")))
}
