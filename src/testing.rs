//! Fixtures and recording doubles shared by the unit tests.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::booking::{AfterCommit, BookingCoordinator, CancellationCoordinator, RetryConfig};
use crate::cache::{CacheError, CacheInvalidator};
use crate::clock::FixedClock;
use crate::events::default_seat_layout;
use crate::models::{
    Booking, BookingDetails, BookingStatus, Event, Seat, SeatStatus, Ticket, WaitlistEntry,
};
use crate::notifications::{Job, JobQueue, Notification, Notifier, QueueError};
use crate::pricing::PricingEngine;
use crate::store::{MemoryStore, Store, StoreError, UnitOfWork};

/// Event priced at 50.00 that starts at `start_time`.
pub fn event_starting(start_time: DateTime<Utc>) -> Event {
    Event {
        id: Uuid::new_v4(),
        name: "Test event".into(),
        venue: "Main hall".into(),
        description: None,
        start_time,
        end_time: start_time + ChronoDuration::hours(2),
        total_capacity: 100,
        base_price: Decimal::new(5000, 2),
        created_by: Uuid::new_v4(),
        created_at: Utc::now(),
    }
}

pub fn sample_event(days_until_start: i64) -> Event {
    event_starting(Utc::now() + ChronoDuration::days(days_until_start))
}

pub async fn seed_event_starting(store: &dyn Store, seats: usize, start_time: DateTime<Utc>) -> Event {
    let mut event = event_starting(start_time);
    event.total_capacity = seats as i32;
    store
        .create_event(&event, &default_seat_layout(seats))
        .await
        .unwrap();
    event
}

/// Event 30 days out with seats `A01-01..` in the default layout.
pub async fn seed_event(store: &dyn Store, seats: usize) -> Event {
    seed_event_starting(store, seats, Utc::now() + ChronoDuration::days(30)).await
}

#[derive(Default)]
pub struct RecordingCache {
    keys: Mutex<Vec<String>>,
}

impl RecordingCache {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingCache {
    async fn invalidate(&self, keys: &[String]) -> Result<(), CacheError> {
        self.keys.lock().unwrap().extend(keys.iter().cloned());
        Ok(())
    }
}

pub struct FailingCache;

#[async_trait]
impl CacheInvalidator for FailingCache {
    async fn invalidate(&self, _keys: &[String]) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
}

/// A cache that accepts the call and never answers.
pub struct HangingCache;

#[async_trait]
impl CacheInvalidator for HangingCache {
    async fn invalidate(&self, _keys: &[String]) -> Result<(), CacheError> {
        std::future::pending().await
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<Job>>,
    reject: bool,
}

impl RecordingQueue {
    pub fn rejecting() -> Self {
        Self {
            jobs: Mutex::default(),
            reject: true,
        }
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }
}

impl JobQueue for RecordingQueue {
    fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        if self.reject {
            return Err(QueueError::Full);
        }
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Records every delivery attempt. Recipients in `failing` get `false`.
#[derive(Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
    failing: HashSet<Uuid>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn failing_for(recipients: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            failing: recipients.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> bool {
        self.received.lock().unwrap().push(notification.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        !self.failing.contains(&notification.recipient)
    }
}

/// Wraps a [`MemoryStore`] so that every commit is applied and then reported
/// as a dropped connection, the way a lost COMMIT acknowledgement looks.
pub struct LostCommitStore {
    inner: MemoryStore,
    begins: AtomicUsize,
}

impl LostCommitStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            begins: AtomicUsize::new(0),
        }
    }

    /// Units of work started so far.
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }
}

fn connection_reset() -> StoreError {
    StoreError::Database(sqlx::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset during commit",
    )))
}

#[async_trait]
impl Store for LostCommitStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LostCommit(self.inner.begin().await?)))
    }

    async fn create_event(&self, event: &Event, seat_identifiers: &[String]) -> Result<(), StoreError> {
        self.inner.create_event(event, seat_identifiers).await
    }

    async fn event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        self.inner.event(event_id).await
    }

    async fn events(
        &self,
        starting_after: Option<DateTime<Utc>>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        self.inner.events(starting_after, skip, limit).await
    }

    async fn seats(&self, event_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        self.inner.seats(event_id).await
    }

    async fn available_seat_count(&self, event_id: Uuid) -> Result<i64, StoreError> {
        self.inner.available_seat_count(event_id).await
    }

    async fn booking_details(&self, booking_id: Uuid) -> Result<Option<BookingDetails>, StoreError> {
        self.inner.booking_details(booking_id).await
    }

    async fn user_bookings(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<BookingDetails>, StoreError> {
        self.inner.user_bookings(user_id, skip, limit).await
    }

    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        self.inner.insert_waitlist_entry(entry).await
    }

    async fn delete_waitlist_entry(&self, user_id: Uuid, event_id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_waitlist_entry(user_id, event_id).await
    }

    async fn waitlist_entries(&self, event_id: Uuid) -> Result<Vec<WaitlistEntry>, StoreError> {
        self.inner.waitlist_entries(event_id).await
    }

    async fn user_waitlist_entries(&self, user_id: Uuid) -> Result<Vec<WaitlistEntry>, StoreError> {
        self.inner.user_waitlist_entries(user_id).await
    }
}

struct LostCommit(Box<dyn UnitOfWork>);

#[async_trait]
impl UnitOfWork for LostCommit {
    async fn lock_seats(
        &mut self,
        event_id: Uuid,
        identifiers: &BTreeSet<String>,
    ) -> Result<Vec<Seat>, StoreError> {
        self.0.lock_seats(event_id, identifiers).await
    }

    async fn transition_seats(
        &mut self,
        seat_ids: &BTreeSet<Uuid>,
        from: SeatStatus,
        to: SeatStatus,
    ) -> Result<u64, StoreError> {
        self.0.transition_seats(seat_ids, from, to).await
    }

    async fn insert_booking(&mut self, booking: &Booking, tickets: &[Ticket]) -> Result<(), StoreError> {
        self.0.insert_booking(booking, tickets).await
    }

    async fn lock_booking(
        &mut self,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingDetails>, StoreError> {
        self.0.lock_booking(booking_id, user_id).await
    }

    async fn set_booking_status(&mut self, booking_id: Uuid, status: BookingStatus) -> Result<(), StoreError> {
        self.0.set_booking_status(booking_id, status).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.0.commit().await?;
        Err(connection_reset())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.0.rollback().await
    }
}

/// Both coordinators wired to recording doubles.
pub struct Harness {
    pub booking: BookingCoordinator,
    pub cancel: CancellationCoordinator,
    pub cache: Arc<RecordingCache>,
    pub queue: Arc<RecordingQueue>,
}

pub fn coordinator_at(store: Arc<MemoryStore>, now: DateTime<Utc>) -> Harness {
    let cache = Arc::new(RecordingCache::default());
    let queue = Arc::new(RecordingQueue::default());
    let after_commit = AfterCommit::new(cache.clone(), queue.clone());

    Harness {
        booking: BookingCoordinator::new(
            store.clone(),
            PricingEngine::default(),
            Arc::new(FixedClock::new(now)),
            after_commit.clone(),
            RetryConfig::default(),
        ),
        cancel: CancellationCoordinator::new(store, after_commit, RetryConfig::default()),
        cache,
        queue,
    }
}
