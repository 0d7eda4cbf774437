//! In-process store used by tests and by deployments without a database.
//!
//! Each seat and booking row has its own async mutex standing in for a
//! Postgres row lock. Writes made inside a unit of work are staged and only
//! become visible to other readers on commit.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreError, UnitOfWork};
use crate::models::{
    Booking, BookingDetails, BookingStatus, Event, Seat, SeatStatus, Ticket, WaitlistEntry,
};

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    seats: HashMap<Uuid, Seat>,
    bookings: HashMap<Uuid, Booking>,
    tickets: HashMap<Uuid, Vec<Ticket>>,
    waitlist: Vec<WaitlistEntry>,
}

impl Tables {
    fn details(&self, booking: &Booking) -> BookingDetails {
        let mut tickets = self.tickets.get(&booking.id).cloned().unwrap_or_default();
        tickets.sort_by(|a, b| a.seat_identifier.cmp(&b.seat_identifier));
        BookingDetails {
            booking: booking.clone(),
            tickets,
        }
    }
}

struct Inner {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                lock_timeout,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork {
            inner: Arc::clone(&self.inner),
            guards: Vec::new(),
            held: HashSet::new(),
            seat_updates: HashMap::new(),
            new_bookings: Vec::new(),
            booking_updates: HashMap::new(),
        }))
    }

    async fn create_event(&self, event: &Event, seat_identifiers: &[String]) -> Result<(), StoreError> {
        let unique: HashSet<&String> = seat_identifiers.iter().collect();
        if unique.len() != seat_identifiers.len() {
            return Err(StoreError::UniqueViolation("uq_event_seat".to_string()));
        }

        let mut tables = self.inner.tables.write().await;
        if tables.events.contains_key(&event.id) {
            return Err(StoreError::UniqueViolation("events_pkey".to_string()));
        }

        tables.events.insert(event.id, event.clone());
        for identifier in seat_identifiers {
            let seat = Seat {
                id: Uuid::new_v4(),
                event_id: event.id,
                seat_identifier: identifier.clone(),
                status: SeatStatus::Available,
            };
            tables.seats.insert(seat.id, seat);
        }
        Ok(())
    }

    async fn event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.inner.tables.read().await.events.get(&event_id).cloned())
    }

    async fn events(
        &self,
        starting_after: Option<DateTime<Utc>>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let tables = self.inner.tables.read().await;
        let mut events: Vec<&Event> = tables
            .events
            .values()
            .filter(|e| starting_after.map_or(true, |after| e.start_time > after))
            .collect();
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));

        Ok(events
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn seats(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        let tables = self.inner.tables.read().await;
        let mut seats: Vec<Seat> = tables
            .seats
            .values()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| a.seat_identifier.cmp(&b.seat_identifier));
        Ok(seats)
    }

    async fn available_seat_count(&self, event_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.inner.tables.read().await;
        let count = tables
            .seats
            .values()
            .filter(|s| s.event_id == event_id && s.is_available())
            .count();
        Ok(count as i64)
    }

    async fn booking_details(&self, booking_id: Uuid) -> Result<Option<BookingDetails>, StoreError> {
        let tables = self.inner.tables.read().await;
        Ok(tables.bookings.get(&booking_id).map(|b| tables.details(b)))
    }

    async fn user_bookings(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<BookingDetails>, StoreError> {
        let tables = self.inner.tables.read().await;
        let mut bookings: Vec<&Booking> = tables
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(bookings
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|b| tables.details(b))
            .collect())
    }

    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        let mut tables = self.inner.tables.write().await;
        let duplicate = tables
            .waitlist
            .iter()
            .any(|e| e.user_id == entry.user_id && e.event_id == entry.event_id);
        if duplicate {
            return Err(StoreError::UniqueViolation("uq_user_event_waitlist".to_string()));
        }
        tables.waitlist.push(entry.clone());
        Ok(())
    }

    async fn delete_waitlist_entry(&self, user_id: Uuid, event_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.inner.tables.write().await;
        let before = tables.waitlist.len();
        tables
            .waitlist
            .retain(|e| !(e.user_id == user_id && e.event_id == event_id));
        Ok(tables.waitlist.len() != before)
    }

    async fn waitlist_entries(&self, event_id: Uuid) -> Result<Vec<WaitlistEntry>, StoreError> {
        let tables = self.inner.tables.read().await;
        let mut entries: Vec<WaitlistEntry> = tables
            .waitlist
            .iter()
            .filter(|e| e.event_id == event_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn user_waitlist_entries(&self, user_id: Uuid) -> Result<Vec<WaitlistEntry>, StoreError> {
        let tables = self.inner.tables.read().await;
        let mut entries: Vec<WaitlistEntry> = tables
            .waitlist
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.joined_at.cmp(&a.joined_at));
        Ok(entries)
    }
}

pub struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    held: HashSet<Uuid>,
    seat_updates: HashMap<Uuid, SeatStatus>,
    new_bookings: Vec<(Booking, Vec<Ticket>)>,
    booking_updates: HashMap<Uuid, BookingStatus>,
}

impl MemoryUnitOfWork {
    /// Acquires the row lock for `id` unless this unit of work already holds it.
    async fn lock_row(&mut self, id: Uuid) -> Result<(), StoreError> {
        if self.held.contains(&id) {
            return Ok(());
        }

        let row_lock = {
            let mut registry = self.inner.row_locks.lock().await;
            Arc::clone(registry.entry(id).or_default())
        };

        let guard = tokio::time::timeout(self.inner.lock_timeout, row_lock.lock_owned())
            .await
            .map_err(|_| {
                debug!(row = %id, "Row lock wait timed out");
                StoreError::LockTimeout
            })?;

        self.guards.push(guard);
        self.held.insert(id);
        Ok(())
    }

    fn seat_status(&self, seat: &Seat) -> SeatStatus {
        self.seat_updates.get(&seat.id).copied().unwrap_or(seat.status)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_seats(
        &mut self,
        event_id: Uuid,
        identifiers: &BTreeSet<String>,
    ) -> Result<Vec<Seat>, StoreError> {
        let mut ids: Vec<Uuid> = {
            let tables = self.inner.tables.read().await;
            tables
                .seats
                .values()
                .filter(|s| s.event_id == event_id && identifiers.contains(&s.seat_identifier))
                .map(|s| s.id)
                .collect()
        };
        ids.sort();

        for id in &ids {
            self.lock_row(*id).await?;
        }

        // Re-read after locking so the caller sees what the previous holder committed.
        let tables = self.inner.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.seats.get(id))
            .map(|seat| Seat {
                status: self.seat_status(seat),
                ..seat.clone()
            })
            .collect())
    }

    async fn transition_seats(
        &mut self,
        seat_ids: &BTreeSet<Uuid>,
        from: SeatStatus,
        to: SeatStatus,
    ) -> Result<u64, StoreError> {
        for id in seat_ids {
            self.lock_row(*id).await?;
        }

        let tables = self.inner.tables.read().await;
        let mut changed = 0;
        for id in seat_ids {
            let Some(seat) = tables.seats.get(id) else {
                continue;
            };
            if self.seat_status(seat) == from {
                self.seat_updates.insert(*id, to);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn insert_booking(&mut self, booking: &Booking, tickets: &[Ticket]) -> Result<(), StoreError> {
        let tables = self.inner.tables.read().await;
        let staged = self.new_bookings.iter().any(|(b, _)| b.id == booking.id);
        if staged || tables.bookings.contains_key(&booking.id) {
            return Err(StoreError::UniqueViolation("bookings_pkey".to_string()));
        }
        drop(tables);

        self.new_bookings.push((booking.clone(), tickets.to_vec()));
        Ok(())
    }

    async fn lock_booking(
        &mut self,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingDetails>, StoreError> {
        let owned = {
            let tables = self.inner.tables.read().await;
            tables
                .bookings
                .get(&booking_id)
                .is_some_and(|b| b.user_id == user_id)
        };
        if !owned {
            return Ok(None);
        }

        self.lock_row(booking_id).await?;

        let tables = self.inner.tables.read().await;
        Ok(tables.bookings.get(&booking_id).map(|booking| {
            let mut details = tables.details(booking);
            if let Some(status) = self.booking_updates.get(&booking_id) {
                details.booking.status = *status;
            }
            details
        }))
    }

    async fn set_booking_status(&mut self, booking_id: Uuid, status: BookingStatus) -> Result<(), StoreError> {
        self.lock_row(booking_id).await?;
        self.booking_updates.insert(booking_id, status);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut tables = this.inner.tables.write().await;

        for (id, status) in &this.seat_updates {
            if let Some(seat) = tables.seats.get_mut(id) {
                seat.status = *status;
            }
        }
        for (booking, tickets) in this.new_bookings {
            tables.tickets.insert(booking.id, tickets);
            tables.bookings.insert(booking.id, booking);
        }
        for (id, status) in &this.booking_updates {
            if let Some(booking) = tables.bookings.get_mut(id) {
                booking.status = *status;
            }
        }

        // Row locks are released only once the writes are visible.
        drop(tables);
        drop(this.guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
