//! Runs against a real Postgres. Start one, export `DATABASE_URL`, then
//! `cargo test -- --ignored`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use evently_server::booking::{
    AfterCommit, BookingCoordinator, BookingError, CancellationCoordinator, RetryConfig,
};
use evently_server::cache::NoopCache;
use evently_server::clock::SystemClock;
use evently_server::events::EventCatalog;
use evently_server::models::{BookingStatus, Event, NewEvent};
use evently_server::notifications::ChannelQueue;
use evently_server::pricing::PricingEngine;
use evently_server::store::{PgStore, Store, StoreError};

async fn connect(lock_timeout: Duration) -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let store = PgStore::connect(&url, 25, lock_timeout).await.unwrap();
    sqlx::migrate!().run(store.pool()).await.unwrap();
    store
}

async fn create_event(store: Arc<PgStore>, seats: i32) -> Event {
    let start = Utc::now() + ChronoDuration::days(30);
    EventCatalog::new(store, PricingEngine::default(), Arc::new(SystemClock))
        .create_event_with_seats(NewEvent {
            name: format!("Integration {}", Uuid::new_v4()),
            venue: "Test venue".into(),
            description: None,
            start_time: start,
            end_time: start + ChronoDuration::hours(2),
            total_capacity: seats,
            base_price: Decimal::new(5000, 2),
            created_by: Uuid::new_v4(),
            seat_layout: None,
        })
        .await
        .unwrap()
}

fn coordinators(store: Arc<PgStore>) -> (BookingCoordinator, CancellationCoordinator) {
    let (queue, _jobs) = ChannelQueue::new(1024);
    let after_commit = AfterCommit::new(Arc::new(NoopCache), Arc::new(queue));
    (
        BookingCoordinator::new(
            store.clone(),
            PricingEngine::default(),
            Arc::new(SystemClock),
            after_commit.clone(),
            RetryConfig::default(),
        ),
        CancellationCoordinator::new(store, after_commit, RetryConfig::default()),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_bookings_of_one_seat_have_one_winner() {
    let store = Arc::new(connect(Duration::from_secs(5)).await);
    let event = create_event(store.clone(), 1).await;
    let (booking, _) = coordinators(store.clone());

    let event_id = event.id;
    let mut handles = Vec::new();
    for _ in 0..20 {
        let booking = booking.clone();
        handles.push(tokio::spawn(async move {
            booking
                .create_booking(Uuid::new_v4(), event_id, &["A01-01".to_string()], None)
                .await
        }));
    }

    let mut confirmed = 0;
    let mut unavailable = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => confirmed += 1,
            Err(BookingError::SeatUnavailable(_)) => unavailable += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!((confirmed, unavailable), (1, 19));
    assert_eq!(store.available_seat_count(event.id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn cancel_releases_seats_once() {
    let store = Arc::new(connect(Duration::from_secs(5)).await);
    let event = create_event(store.clone(), 3).await;
    let (booking, cancellation) = coordinators(store.clone());
    let user = Uuid::new_v4();

    let seats: Vec<String> = ["A01-01", "A01-02", "A01-03"].map(String::from).to_vec();
    let details = booking.create_booking(user, event.id, &seats, None).await.unwrap();
    assert_eq!(details.tickets.len(), 3);

    let first = cancellation.cancel(details.booking.id, user).await.unwrap().unwrap();
    let second = cancellation.cancel(details.booking.id, user).await.unwrap().unwrap();

    assert_eq!(first.booking.status, BookingStatus::Cancelled);
    assert_eq!(first.booking.id, second.booking.id);
    assert_eq!(second.booking.status, BookingStatus::Cancelled);
    assert_eq!(second.booking.total_amount, details.booking.total_amount);
    assert_eq!(store.available_seat_count(event.id).await.unwrap(), 3);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn held_seat_lock_times_out() {
    let store = Arc::new(connect(Duration::from_millis(100)).await);
    let event = create_event(store.clone(), 1).await;
    let wanted: BTreeSet<String> = ["A01-01".to_string()].into();

    let mut holder = store.begin().await.unwrap();
    holder.lock_seats(event.id, &wanted).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let result = waiter.lock_seats(event.id, &wanted).await;
    assert!(matches!(result, Err(StoreError::LockTimeout)));

    waiter.rollback().await.ok();
    holder.rollback().await.unwrap();
}
