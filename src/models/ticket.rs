use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Concerts,
    Sports,
    Theater,
    Conferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    /// Positive, fixed-precision price.
    pub price: Decimal,
    pub category: Category,
    /// Bumped on every successful reserve/release/confirm. The optimistic
    /// concurrency token for all ledger writes.
    pub version: u64,
    /// Set while a pending (`Created`) order holds this ticket.
    pub reserving_order_id: Option<Uuid>,
    /// Set once by `confirm`, never cleared. A sold ticket cannot be reserved.
    pub sold_order_id: Option<Uuid>,
}

impl Ticket {
    pub fn new(title: impl Into<String>, price: Decimal, category: Category) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            price,
            category,
            version: 0,
            reserving_order_id: None,
            sold_order_id: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.reserving_order_id.is_none() && self.sold_order_id.is_none()
    }
}
