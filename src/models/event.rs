use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub venue: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_capacity: i32,
    pub base_price: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an event together with its seat batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub venue: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_capacity: i32,
    pub base_price: Decimal,
    pub created_by: Uuid,
    /// Explicit seat identifiers. `None` means the default linear layout.
    pub seat_layout: Option<Vec<String>>,
}
