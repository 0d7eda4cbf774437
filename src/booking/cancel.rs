use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AfterCommit, RetryConfig};
use crate::ledger;
use crate::models::{BookingDetails, BookingStatus};
use crate::notifications::Job;
use crate::store::{Store, StoreError, UnitOfWork};

#[derive(Debug, Error)]
pub enum CancelError {
    #[error("Booking is busy, gave up after {attempts} attempts")]
    Contention { attempts: u32 },

    /// The commit itself failed; the cancellation may or may not be stored.
    #[error("Cancellation outcome unknown, commit failed: {0}")]
    CommitFailed(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CancelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CancelError::Contention { .. } | CancelError::CommitFailed(_) => true,
            CancelError::Store(e) => e.is_retryable(),
        }
    }
}

enum Outcome {
    NotFound,
    AlreadyCancelled(BookingDetails),
    Cancelled { details: BookingDetails, released: u64 },
}

#[derive(Clone)]
pub struct CancellationCoordinator {
    store: Arc<dyn Store>,
    after_commit: AfterCommit,
    retry: RetryConfig,
}

impl CancellationCoordinator {
    pub fn new(store: Arc<dyn Store>, after_commit: AfterCommit, retry: RetryConfig) -> Self {
        Self {
            store,
            after_commit,
            retry,
        }
    }

    /// Cancels the booking if `user_id` owns it.
    ///
    /// Returns `Ok(None)` when the booking does not exist or belongs to
    /// someone else. Cancelling an already cancelled booking returns it as is
    /// and has no side effects.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BookingDetails>, CancelError> {
        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match self.attempt(booking_id, user_id).await {
                Ok(outcome) => break outcome,
                Err(CancelError::Store(e)) if e.is_retryable() => {
                    if attempt >= self.retry.max_attempts {
                        warn!(%booking_id, attempts = attempt, error = %e, "Giving up on contended cancellation");
                        return Err(CancelError::Contention { attempts: attempt });
                    }
                    let delay = self.retry.delay_for(attempt);
                    debug!(%booking_id, attempt, ?delay, error = %e, "Retrying cancellation");
                    tokio::time::sleep(delay).await;
                }
                Err(CancelError::CommitFailed(e)) => {
                    warn!(%booking_id, %user_id, error = %e, "Cancellation commit failed, outcome unknown");
                    return Err(CancelError::CommitFailed(e));
                }
                Err(e) => return Err(e),
            }
        };

        match outcome {
            Outcome::NotFound => Ok(None),
            Outcome::AlreadyCancelled(details) => {
                debug!(%booking_id, "Booking already cancelled");
                Ok(Some(details))
            }
            Outcome::Cancelled { details, released } => {
                let event_id = details.booking.event_id;
                info!(%booking_id, %user_id, %event_id, released, "Booking cancelled");

                self.after_commit.invalidate_seat_map(event_id).await;
                self.after_commit.enqueue(Job::BookingCancelled { booking_id });
                self.trigger_waitlist(event_id).await;

                Ok(Some(details))
            }
        }
    }

    async fn trigger_waitlist(&self, event_id: Uuid) {
        match self.store.available_seat_count(event_id).await {
            Ok(available) if available > 0 => {
                self.after_commit.enqueue(Job::WaitlistFanOut { event_id });
            }
            Ok(_) => debug!(%event_id, "No seats available, waitlist not notified"),
            Err(e) => warn!(%event_id, error = %e, "Could not count available seats"),
        }
    }

    /// A failing commit is reported as [`CancelError::CommitFailed`] so the
    /// caller does not re-run it.
    async fn attempt(&self, booking_id: Uuid, user_id: Uuid) -> Result<Outcome, CancelError> {
        let mut tx = self.store.begin().await?;

        match stage(tx.as_mut(), booking_id, user_id).await {
            Ok(outcome @ Outcome::Cancelled { .. }) => {
                tx.commit().await.map_err(CancelError::CommitFailed)?;
                Ok(outcome)
            }
            Ok(outcome) => {
                tx.rollback().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(%booking_id, error = %rollback_error, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }
}

async fn stage(
    tx: &mut dyn UnitOfWork,
    booking_id: Uuid,
    user_id: Uuid,
) -> Result<Outcome, StoreError> {
    let Some(mut details) = tx.lock_booking(booking_id, user_id).await? else {
        return Ok(Outcome::NotFound);
    };
    if details.booking.is_cancelled() {
        return Ok(Outcome::AlreadyCancelled(details));
    }

    let seat_ids: BTreeSet<Uuid> = details.tickets.iter().map(|t| t.seat_id).collect();
    let released = ledger::release(tx, &seat_ids).await?;
    tx.set_booking_status(booking_id, BookingStatus::Cancelled).await?;

    details.booking.status = BookingStatus::Cancelled;
    Ok(Outcome::Cancelled { details, released })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::SeatStatus;
    use crate::store::MemoryStore;
    use crate::testing::{
        coordinator_at, seed_event, HangingCache, LostCommitStore, RecordingCache, RecordingNotifier,
        RecordingQueue,
    };
    use crate::waitlist::{FanOutReport, WaitlistNotifier, WaitlistRegistry};

    fn seats(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cancel_releases_seats_and_keeps_snapshot() {
        let store = Arc::new(MemoryStore::default());
        let event = seed_event(store.as_ref(), 4).await;
        let harness = coordinator_at(store.clone(), Utc::now());
        let user = Uuid::new_v4();

        let booked = harness
            .booking
            .create_booking(user, event.id, &seats(&["A01-01", "A01-02", "A01-03"]), None)
            .await
            .unwrap();
        assert_eq!(store.available_seat_count(event.id).await.unwrap(), 1);

        let cancelled = harness
            .cancel
            .cancel(booked.booking.id, user)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.booking.total_amount, booked.booking.total_amount);
        assert_eq!(cancelled.tickets, booked.tickets);
        assert!(store
            .seats(event.id)
            .await
            .unwrap()
            .iter()
            .all(|s| s.status == SeatStatus::Available));

        let stored = store.booking_details(booked.booking.id).await.unwrap().unwrap();
        assert_eq!(stored.booking.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let event = seed_event(store.as_ref(), 2).await;
        let harness = coordinator_at(store.clone(), Utc::now());
        let user = Uuid::new_v4();

        let booked = harness
            .booking
            .create_booking(user, event.id, &seats(&["A01-01"]), None)
            .await
            .unwrap();
        let first = harness.cancel.cancel(booked.booking.id, user).await.unwrap();

        // Someone else takes the released seat before the repeated cancel.
        harness
            .booking
            .create_booking(Uuid::new_v4(), event.id, &seats(&["A01-01"]), None)
            .await
            .unwrap();
        let jobs_before = harness.queue.jobs().len();

        let second = harness.cancel.cancel(booked.booking.id, user).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.available_seat_count(event.id).await.unwrap(), 1);
        assert_eq!(harness.queue.jobs().len(), jobs_before);
    }

    #[tokio::test]
    async fn test_foreign_or_unknown_booking_is_none() {
        let store = Arc::new(MemoryStore::default());
        let event = seed_event(store.as_ref(), 1).await;
        let harness = coordinator_at(store.clone(), Utc::now());
        let owner = Uuid::new_v4();

        let booked = harness
            .booking
            .create_booking(owner, event.id, &seats(&["A01-01"]), None)
            .await
            .unwrap();

        let stranger = harness.cancel.cancel(booked.booking.id, Uuid::new_v4()).await.unwrap();
        assert!(stranger.is_none());
        let unknown = harness.cancel.cancel(Uuid::new_v4(), owner).await.unwrap();
        assert!(unknown.is_none());

        assert_eq!(store.available_seat_count(event.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_enqueues_notice_and_waitlist_fan_out() {
        let store = Arc::new(MemoryStore::default());
        let event = seed_event(store.as_ref(), 1).await;
        let harness = coordinator_at(store.clone(), Utc::now());
        let user = Uuid::new_v4();

        let booked = harness
            .booking
            .create_booking(user, event.id, &seats(&["A01-01"]), None)
            .await
            .unwrap();
        harness.cancel.cancel(booked.booking.id, user).await.unwrap();

        assert_eq!(
            harness.queue.jobs(),
            vec![
                Job::BookingConfirmed {
                    booking_id: booked.booking.id
                },
                Job::BookingCancelled {
                    booking_id: booked.booking.id
                },
                Job::WaitlistFanOut { event_id: event.id },
            ]
        );
        assert_eq!(harness.cache.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_then_notify_whole_waitlist() {
        let store = Arc::new(MemoryStore::default());
        let event = seed_event(store.as_ref(), 3).await;
        let harness = coordinator_at(store.clone(), Utc::now());
        let user = Uuid::new_v4();

        let booked = harness
            .booking
            .create_booking(user, event.id, &seats(&["A01-01", "A01-02", "A01-03"]), None)
            .await
            .unwrap();
        let registry = WaitlistRegistry::new(store.clone(), Arc::new(crate::clock::SystemClock));
        for _ in 0..5 {
            registry.join(Uuid::new_v4(), event.id).await.unwrap();
        }

        harness.cancel.cancel(booked.booking.id, user).await.unwrap();
        assert_eq!(store.available_seat_count(event.id).await.unwrap(), 3);
        assert!(harness
            .queue
            .jobs()
            .contains(&Job::WaitlistFanOut { event_id: event.id }));

        let notifier = Arc::new(RecordingNotifier::default());
        let fan_out = WaitlistNotifier::new(store, notifier.clone(), std::time::Duration::from_secs(1));
        let report = fan_out.notify_all(event.id).await.unwrap();

        assert_eq!(report, FanOutReport { sent: 5, failed: 0 });
        assert_eq!(notifier.received().len(), 5);
    }

    #[tokio::test]
    async fn test_unresponsive_cache_does_not_block_cancellation() {
        let store = Arc::new(MemoryStore::default());
        let event = seed_event(store.as_ref(), 1).await;
        let user = Uuid::new_v4();
        let booked = coordinator_at(store.clone(), Utc::now())
            .booking
            .create_booking(user, event.id, &seats(&["A01-01"]), None)
            .await
            .unwrap();

        let queue = Arc::new(RecordingQueue::default());
        let cancellation = CancellationCoordinator::new(
            store.clone(),
            AfterCommit::new(Arc::new(HangingCache), queue.clone())
                .with_cache_timeout(std::time::Duration::from_millis(50)),
            RetryConfig::default(),
        );

        let cancelled = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            cancellation.cancel(booked.booking.id, user),
        )
        .await
        .expect("cancellation should return despite the cache")
        .unwrap()
        .unwrap();

        assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
        assert_eq!(
            queue.jobs(),
            vec![
                Job::BookingCancelled {
                    booking_id: booked.booking.id
                },
                Job::WaitlistFanOut { event_id: event.id },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_commit_is_reported_not_retried() {
        let memory = MemoryStore::default();
        let event = seed_event(&memory, 1).await;
        let user = Uuid::new_v4();
        let booked = coordinator_at(Arc::new(memory.clone()), Utc::now())
            .booking
            .create_booking(user, event.id, &seats(&["A01-01"]), None)
            .await
            .unwrap();

        let store = Arc::new(LostCommitStore::new(memory.clone()));
        let queue = Arc::new(RecordingQueue::default());
        let cancellation = CancellationCoordinator::new(
            store.clone(),
            AfterCommit::new(Arc::new(RecordingCache::default()), queue.clone()),
            RetryConfig::new(3, std::time::Duration::from_millis(1)),
        );

        let result = cancellation.cancel(booked.booking.id, user).await;

        assert!(matches!(result, Err(CancelError::CommitFailed(_))));
        assert_eq!(store.begins(), 1);
        assert!(queue.jobs().is_empty());
        assert_eq!(memory.available_seat_count(event.id).await.unwrap(), 1);
    }
}
