//! Persistence seam.
//!
//! [`Store`] covers reads and single-statement writes that need no
//! coordination. Anything that touches seat status goes through a
//! [`UnitOfWork`], which holds row locks until it is committed or rolled back.
//! Dropping a unit of work without committing rolls it back.

pub mod memory;
pub mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Booking, BookingDetails, BookingStatus, Event, Seat, SeatStatus, Ticket, WaitlistEntry,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Timed out waiting for a row lock")]
    LockTimeout,

    #[error("Deadlock detected")]
    Deadlock,

    #[error("Concurrent update conflict")]
    SerializationFailure,

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Errors a caller may resolve by re-running the whole unit of work.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::LockTimeout | StoreError::Deadlock | StoreError::SerializationFailure => {
                true
            }
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            StoreError::UniqueViolation(_) => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_error) = &error {
            match db_error.code().as_deref() {
                Some("55P03") => return StoreError::LockTimeout,
                Some("40P01") => return StoreError::Deadlock,
                Some("40001") => return StoreError::SerializationFailure,
                Some("23505") => {
                    return StoreError::UniqueViolation(
                        db_error.constraint().unwrap_or("unknown").to_string(),
                    )
                }
                _ => {}
            }
        }
        StoreError::Database(error)
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Inserts the event and its seat batch atomically.
    async fn create_event(&self, event: &Event, seat_identifiers: &[String])
        -> Result<(), StoreError>;

    async fn event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError>;

    /// Ordered by start time. `starting_after` keeps only events that start
    /// strictly later.
    async fn events(
        &self,
        starting_after: Option<DateTime<Utc>>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError>;

    async fn seats(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError>;

    async fn available_seat_count(&self, event_id: Uuid) -> Result<i64, StoreError>;

    async fn booking_details(&self, booking_id: Uuid) -> Result<Option<BookingDetails>, StoreError>;

    /// Newest first.
    async fn user_bookings(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<BookingDetails>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when the user is already
    /// on the event's waitlist.
    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError>;

    async fn delete_waitlist_entry(&self, user_id: Uuid, event_id: Uuid) -> Result<bool, StoreError>;

    /// Oldest first.
    async fn waitlist_entries(&self, event_id: Uuid) -> Result<Vec<WaitlistEntry>, StoreError>;

    /// Newest first.
    async fn user_waitlist_entries(&self, user_id: Uuid) -> Result<Vec<WaitlistEntry>, StoreError>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    /// Exclusively locks the seats of `event_id` named in `identifiers`, in
    /// ascending seat id order, and returns them as currently committed.
    /// Identifiers that do not exist are simply absent from the result.
    async fn lock_seats(
        &mut self,
        event_id: Uuid,
        identifiers: &BTreeSet<String>,
    ) -> Result<Vec<Seat>, StoreError>;

    /// Moves every listed seat currently in `from` to `to`; returns how many
    /// rows changed.
    async fn transition_seats(
        &mut self,
        seat_ids: &BTreeSet<Uuid>,
        from: SeatStatus,
        to: SeatStatus,
    ) -> Result<u64, StoreError>;

    async fn insert_booking(&mut self, booking: &Booking, tickets: &[Ticket])
        -> Result<(), StoreError>;

    /// Locks the booking row if it exists and belongs to `user_id`.
    async fn lock_booking(
        &mut self,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingDetails>, StoreError>;

    async fn set_booking_status(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
