use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AfterCommit, BookingPhase, RetryConfig};
use crate::clock::Clock;
use crate::ledger::{self, LedgerError};
use crate::models::{Booking, BookingDetails, BookingStatus, Event, Ticket};
use crate::notifications::Job;
use crate::pricing::{price_matches, PricingEngine};
use crate::store::{Store, StoreError, UnitOfWork};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("At least one seat must be requested")]
    NoSeatsRequested,

    #[error("Event {0} not found")]
    EventNotFound(Uuid),

    #[error("Seats not found: {}", .0.join(", "))]
    SeatNotFound(Vec<String>),

    #[error("Seats not available: {}", .0.join(", "))]
    SeatUnavailable(Vec<String>),

    #[error("Price changed from {acknowledged} to {current}")]
    PriceChanged {
        current: Decimal,
        acknowledged: Decimal,
    },

    #[error("Seats are busy, gave up after {attempts} attempts")]
    Contention { attempts: u32 },

    /// The commit itself failed; the booking may or may not exist.
    #[error("Booking outcome unknown, commit failed: {0}")]
    CommitFailed(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BookingError::Contention { .. } | BookingError::CommitFailed(_) => true,
            BookingError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::SeatNotFound(ids) => BookingError::SeatNotFound(ids),
            LedgerError::SeatUnavailable(ids) => BookingError::SeatUnavailable(ids),
            LedgerError::Store(e) => BookingError::Store(e),
        }
    }
}

/// Price captured once per request and written onto the booking row.
#[derive(Debug, Clone, Copy)]
struct PriceSnapshot {
    base: Decimal,
    multiplier: Decimal,
    per_ticket: Decimal,
    taken_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct BookingCoordinator {
    store: Arc<dyn Store>,
    pricing: PricingEngine,
    clock: Arc<dyn Clock>,
    after_commit: AfterCommit,
    retry: RetryConfig,
}

impl BookingCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        pricing: PricingEngine,
        clock: Arc<dyn Clock>,
        after_commit: AfterCommit,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            pricing,
            clock,
            after_commit,
            retry,
        }
    }

    /// Books `seat_identifiers` for `user_id` at the current price.
    ///
    /// Duplicate identifiers are collapsed. When `acknowledged_price` is
    /// given and differs from the current per-ticket price by more than one
    /// cent the request fails with [`BookingError::PriceChanged`] before any
    /// seat is locked.
    pub async fn create_booking(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_identifiers: &[String],
        acknowledged_price: Option<Decimal>,
    ) -> Result<BookingDetails, BookingError> {
        debug!(phase = %BookingPhase::Validating, %user_id, %event_id, "Booking attempt");
        if seat_identifiers.is_empty() {
            return Err(BookingError::NoSeatsRequested);
        }
        let requested: BTreeSet<String> = seat_identifiers.iter().cloned().collect();

        let event = self
            .store
            .event(event_id)
            .await?
            .ok_or(BookingError::EventNotFound(event_id))?;

        debug!(phase = %BookingPhase::Pricing, %event_id, "Booking attempt");
        let snapshot = self.snapshot(&event);
        if let Some(acknowledged) = acknowledged_price {
            if !price_matches(snapshot.per_ticket, acknowledged) {
                info!(
                    phase = %BookingPhase::Aborted,
                    %event_id,
                    current = %snapshot.per_ticket,
                    %acknowledged,
                    "Acknowledged price is stale"
                );
                return Err(BookingError::PriceChanged {
                    current: snapshot.per_ticket,
                    acknowledged,
                });
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(user_id, &event, &requested, snapshot).await {
                Ok(details) => {
                    info!(
                        phase = %BookingPhase::Confirmed,
                        booking_id = %details.booking.id,
                        %user_id,
                        %event_id,
                        seats = details.tickets.len(),
                        total = %details.booking.total_amount,
                        "Booking confirmed"
                    );
                    self.after_commit.invalidate_seat_map(event_id).await;
                    self.after_commit.enqueue(Job::BookingConfirmed {
                        booking_id: details.booking.id,
                    });
                    return Ok(details);
                }
                Err(BookingError::Store(e)) if e.is_retryable() => {
                    if attempt >= self.retry.max_attempts {
                        warn!(
                            phase = %BookingPhase::Aborted,
                            %event_id,
                            attempts = attempt,
                            error = %e,
                            "Giving up on contended booking"
                        );
                        return Err(BookingError::Contention { attempts: attempt });
                    }
                    let delay = self.retry.delay_for(attempt);
                    debug!(%event_id, attempt, ?delay, error = %e, "Retrying booking");
                    tokio::time::sleep(delay).await;
                }
                Err(BookingError::CommitFailed(e)) => {
                    warn!(
                        phase = %BookingPhase::Aborted,
                        %event_id,
                        %user_id,
                        error = %e,
                        "Booking commit failed, outcome unknown"
                    );
                    return Err(BookingError::CommitFailed(e));
                }
                Err(e) => {
                    info!(phase = %BookingPhase::Aborted, %event_id, error = %e, "Booking rejected");
                    return Err(e);
                }
            }
        }
    }

    fn snapshot(&self, event: &Event) -> PriceSnapshot {
        let now = self.clock.now();
        let days = PricingEngine::days_until(event.start_time, now);
        PriceSnapshot {
            base: event.base_price,
            multiplier: self.pricing.multiplier(days),
            per_ticket: self.pricing.price(event.base_price, event.start_time, now),
            taken_at: now,
        }
    }

    /// One unit of work: claim, insert, commit. Rolled back on any error
    /// raised before the commit; a failing commit is reported as
    /// [`BookingError::CommitFailed`] and never retried.
    async fn attempt(
        &self,
        user_id: Uuid,
        event: &Event,
        requested: &BTreeSet<String>,
        snapshot: PriceSnapshot,
    ) -> Result<BookingDetails, BookingError> {
        let mut tx = self.store.begin().await?;

        match stage(tx.as_mut(), user_id, event, requested, snapshot).await {
            Ok(details) => {
                debug!(phase = %BookingPhase::Committing, booking_id = %details.booking.id, "Committing booking");
                tx.commit().await.map_err(BookingError::CommitFailed)?;
                Ok(details)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(event_id = %event.id, error = %rollback_error, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn stage(
    tx: &mut dyn UnitOfWork,
    user_id: Uuid,
    event: &Event,
    requested: &BTreeSet<String>,
    snapshot: PriceSnapshot,
) -> Result<BookingDetails, BookingError> {
    debug!(phase = %BookingPhase::Locking, event_id = %event.id, seats = requested.len(), "Claiming seats");
    let seats = ledger::claim(tx, event.id, requested).await?;

    let ticket_count = Decimal::from(seats.len());
    let booking = Booking {
        id: Uuid::new_v4(),
        user_id,
        event_id: event.id,
        status: BookingStatus::Confirmed,
        base_price_per_ticket: snapshot.base,
        final_price_per_ticket: snapshot.per_ticket,
        price_multiplier: snapshot.multiplier,
        total_amount: (snapshot.per_ticket * ticket_count).round_dp(2),
        created_at: snapshot.taken_at,
    };
    let tickets: Vec<Ticket> = seats
        .iter()
        .map(|seat| Ticket::issue(booking.id, seat.id, seat.seat_identifier.clone()))
        .collect();

    tx.insert_booking(&booking, &tickets).await?;
    Ok(BookingDetails { booking, tickets })
}
