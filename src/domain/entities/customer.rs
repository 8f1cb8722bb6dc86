use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Customer aggregate maintained alongside orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub exchange_house_id: i64,
    pub name: String,
    /// Orders that were not cancelled
    pub total_orders: i64,
    /// Sum of base amounts of those orders
    pub total_volume: Decimal,
    pub last_order_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    OrderCreated,
    OrderCompleted,
    OrderCancelled,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::OrderCreated => "order_created",
            ActivityType::OrderCompleted => "order_completed",
            ActivityType::OrderCancelled => "order_cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerActivity {
    pub id: i64,
    pub customer_id: i64,
    pub order_id: Option<i64>,
    pub activity_type: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
