use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreError, UnitOfWork};
use crate::models::{
    Booking, BookingDetails, BookingStatus, Event, Seat, SeatStatus, Ticket, WaitlistEntry,
};

const SELECT_EVENT_COLUMNS: &str = "SELECT id, name, venue, description, start_time, end_time, \
     total_capacity, base_price, created_by, created_at FROM events";

const SELECT_BOOKING_COLUMNS: &str = "SELECT id, user_id, event_id, status, \
     base_price_per_ticket, final_price_per_ticket, price_multiplier, total_amount, created_at \
     FROM bookings";

const SELECT_TICKETS: &str = "SELECT t.id, t.booking_id, t.seat_id, s.seat_identifier, \
     t.qr_code_data FROM tickets t JOIN seats s ON s.id = t.seat_id \
     WHERE t.booking_id = ANY($1) ORDER BY s.seat_identifier";

/// Postgres-backed store. Seat claims rely on `SELECT ... FOR UPDATE` with a
/// per-transaction `lock_timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, lock_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn tickets_for<'e, E>(executor: E, booking_ids: &[Uuid]) -> Result<Vec<Ticket>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let tickets = sqlx::query_as::<_, Ticket>(SELECT_TICKETS)
        .bind(booking_ids)
        .fetch_all(executor)
        .await?;
    Ok(tickets)
}

fn attach_tickets(bookings: Vec<Booking>, tickets: Vec<Ticket>) -> Vec<BookingDetails> {
    let mut by_booking: HashMap<Uuid, Vec<Ticket>> = HashMap::new();
    for ticket in tickets {
        by_booking.entry(ticket.booking_id).or_default().push(ticket);
    }

    bookings
        .into_iter()
        .map(|booking| BookingDetails {
            tickets: by_booking.remove(&booking.id).unwrap_or_default(),
            booking,
        })
        .collect()
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // SET does not accept bind parameters.
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn create_event(&self, event: &Event, seat_identifiers: &[String]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO events (id, name, venue, description, start_time, end_time, \
             total_capacity, base_price, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(event.id)
        .bind(&event.name)
        .bind(&event.venue)
        .bind(&event.description)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.total_capacity)
        .bind(event.base_price)
        .bind(event.created_by)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        let seat_ids: Vec<Uuid> = seat_identifiers.iter().map(|_| Uuid::new_v4()).collect();
        sqlx::query(
            "INSERT INTO seats (id, event_id, seat_identifier, status) \
             SELECT seat.id, $1, seat.identifier, 'AVAILABLE' \
             FROM UNNEST($2::uuid[], $3::text[]) AS seat(id, identifier)",
        )
        .bind(event.id)
        .bind(&seat_ids)
        .bind(seat_identifiers)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(&format!("{SELECT_EVENT_COLUMNS} WHERE id = $1"))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn events(
        &self,
        starting_after: Option<DateTime<Utc>>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "{SELECT_EVENT_COLUMNS} WHERE ($1::timestamptz IS NULL OR start_time > $1) \
             ORDER BY start_time, id OFFSET $2 LIMIT $3"
        ))
        .bind(starting_after)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn seats(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT id, event_id, seat_identifier, status FROM seats \
             WHERE event_id = $1 ORDER BY seat_identifier",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    async fn available_seat_count(&self, event_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM seats WHERE event_id = $1 AND status = $2",
        )
        .bind(event_id)
        .bind(SeatStatus::Available)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn booking_details(&self, booking_id: Uuid) -> Result<Option<BookingDetails>, StoreError> {
        let booking = sqlx::query_as::<_, Booking>(&format!("{SELECT_BOOKING_COLUMNS} WHERE id = $1"))
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(booking) = booking else {
            return Ok(None);
        };
        let tickets = tickets_for(&self.pool, &[booking.id]).await?;
        Ok(Some(BookingDetails { booking, tickets }))
    }

    async fn user_bookings(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<BookingDetails>, StoreError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "{SELECT_BOOKING_COLUMNS} WHERE user_id = $1 \
             ORDER BY created_at DESC OFFSET $2 LIMIT $3"
        ))
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();
        let tickets = tickets_for(&self.pool, &ids).await?;
        Ok(attach_tickets(bookings, tickets))
    }

    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO waitlist_entries (id, user_id, event_id, joined_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.event_id)
        .bind(entry.joined_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_waitlist_entry(&self, user_id: Uuid, event_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM waitlist_entries WHERE user_id = $1 AND event_id = $2")
            .bind(user_id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn waitlist_entries(&self, event_id: Uuid) -> Result<Vec<WaitlistEntry>, StoreError> {
        let entries = sqlx::query_as::<_, WaitlistEntry>(
            "SELECT id, user_id, event_id, joined_at FROM waitlist_entries \
             WHERE event_id = $1 ORDER BY joined_at, id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn user_waitlist_entries(&self, user_id: Uuid) -> Result<Vec<WaitlistEntry>, StoreError> {
        let entries = sqlx::query_as::<_, WaitlistEntry>(
            "SELECT id, user_id, event_id, joined_at FROM waitlist_entries \
             WHERE user_id = $1 ORDER BY joined_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_seats(
        &mut self,
        event_id: Uuid,
        identifiers: &BTreeSet<String>,
    ) -> Result<Vec<Seat>, StoreError> {
        let identifiers: Vec<&str> = identifiers.iter().map(String::as_str).collect();

        // Rows are locked in the ORDER BY order, which keeps multi-seat claims
        // from deadlocking each other.
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT id, event_id, seat_identifier, status FROM seats \
             WHERE event_id = $1 AND seat_identifier = ANY($2) \
             ORDER BY id FOR UPDATE",
        )
        .bind(event_id)
        .bind(&identifiers)
        .fetch_all(&mut *self.tx)
        .await?;

        debug!(%event_id, locked = seats.len(), "Locked seat rows");
        Ok(seats)
    }

    async fn transition_seats(
        &mut self,
        seat_ids: &BTreeSet<Uuid>,
        from: SeatStatus,
        to: SeatStatus,
    ) -> Result<u64, StoreError> {
        let ids: Vec<Uuid> = seat_ids.iter().copied().collect();
        let result = sqlx::query("UPDATE seats SET status = $3 WHERE id = ANY($1) AND status = $2")
            .bind(&ids)
            .bind(from)
            .bind(to)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_booking(&mut self, booking: &Booking, tickets: &[Ticket]) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bookings (id, user_id, event_id, status, base_price_per_ticket, \
             final_price_per_ticket, price_multiplier, total_amount, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.event_id)
        .bind(booking.status)
        .bind(booking.base_price_per_ticket)
        .bind(booking.final_price_per_ticket)
        .bind(booking.price_multiplier)
        .bind(booking.total_amount)
        .bind(booking.created_at)
        .execute(&mut *self.tx)
        .await?;

        let ids: Vec<Uuid> = tickets.iter().map(|t| t.id).collect();
        let seat_ids: Vec<Uuid> = tickets.iter().map(|t| t.seat_id).collect();
        let tokens: Vec<&str> = tickets.iter().map(|t| t.qr_code_data.as_str()).collect();

        sqlx::query(
            "INSERT INTO tickets (id, booking_id, seat_id, qr_code_data) \
             SELECT ticket.id, $1, ticket.seat_id, ticket.token \
             FROM UNNEST($2::uuid[], $3::uuid[], $4::text[]) AS ticket(id, seat_id, token)",
        )
        .bind(booking.id)
        .bind(&ids)
        .bind(&seat_ids)
        .bind(&tokens)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn lock_booking(
        &mut self,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingDetails>, StoreError> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "{SELECT_BOOKING_COLUMNS} WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(booking) = booking else {
            return Ok(None);
        };
        let tickets = tickets_for(&mut *self.tx, &[booking.id]).await?;
        Ok(Some(BookingDetails { booking, tickets }))
    }

    async fn set_booking_status(&mut self, booking_id: Uuid, status: BookingStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE bookings SET status = $2 WHERE id = $1")
            .bind(booking_id)
            .bind(status)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
