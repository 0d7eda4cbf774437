use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// A booking row. The pricing fields are a snapshot taken at creation and are
/// never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub status: BookingStatus,
    pub base_price_per_ticket: Decimal,
    pub final_price_per_ticket: Decimal,
    pub price_multiplier: Decimal,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }
}

/// A ticket row joined with the identifier of the seat it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub seat_id: Uuid,
    pub seat_identifier: String,
    pub qr_code_data: String,
}

impl Ticket {
    pub fn issue(booking_id: Uuid, seat_id: Uuid, seat_identifier: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            seat_id,
            seat_identifier: seat_identifier.into(),
            qr_code_data: format!(
                "booking_{}_seat_{}_{}",
                booking_id.simple(),
                seat_id.simple(),
                Uuid::new_v4().simple()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
}
