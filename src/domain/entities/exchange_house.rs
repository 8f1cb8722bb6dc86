use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant of the platform: one currency exchange business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeHouse {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    /// Platform waives its commission while the promotion runs
    pub zero_commission_promo: bool,
    pub promo_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ExchangeHouse {
    pub fn has_active_promo(&self, now: DateTime<Utc>) -> bool {
        self.zero_commission_promo && self.promo_expires_at.map_or(true, |expiry| expiry > now)
    }
}

/// Acting operator and the exchange house they were authorized against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorContext {
    pub operator_id: i64,
    pub exchange_house_id: i64,
}
