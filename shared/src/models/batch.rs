//! Production batch models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ProductSummary;

/// Days ahead that count as "expiring soon"
pub const EXPIRING_WINDOW_DAYS: i64 = 7;

/// A manufactured lot of one product with a depletable quantity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    pub id: Uuid,
    /// Unique, upper-cased batch code
    pub code: String,
    pub product_id: Uuid,
    pub manufactured_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub initial_quantity: i32,
    pub current_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Whether `quantity` can be drawn from this batch right now
    pub fn has_available(&self, quantity: i32) -> bool {
        quantity <= self.current_quantity
    }

    /// Whether the batch expires between `now` and the expiring window
    pub fn is_expiring(&self, now: DateTime<Utc>) -> bool {
        self.expires_at >= now && self.expires_at <= now + Duration::days(EXPIRING_WINDOW_DAYS)
    }
}

/// Batch fields shown on a transfer line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub id: Uuid,
    pub code: String,
    pub product: ProductSummary,
    pub manufactured_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current_quantity: i32,
}

/// Normalise a batch code the way it is stored
pub fn normalize_batch_code(code: &str) -> String {
    code.trim().to_uppercase()
}
