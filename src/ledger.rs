//! Seat ledger: the only code that changes `Seat.status`.
//!
//! Both operations run inside a caller-owned [`UnitOfWork`] and never commit
//! on their own.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Seat, SeatStatus};
use crate::store::{StoreError, UnitOfWork};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Seats not found: {}", .0.join(", "))]
    SeatNotFound(Vec<String>),

    #[error("Seats not available: {}", .0.join(", "))]
    SeatUnavailable(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Locks the requested seats and moves them from AVAILABLE to BOOKED.
///
/// Missing identifiers are reported before availability, and both error
/// variants list identifiers in sorted order.
pub async fn claim(
    tx: &mut dyn UnitOfWork,
    event_id: Uuid,
    identifiers: &BTreeSet<String>,
) -> Result<Vec<Seat>, LedgerError> {
    let seats = tx.lock_seats(event_id, identifiers).await?;

    let found: BTreeSet<&str> = seats.iter().map(|s| s.seat_identifier.as_str()).collect();
    let missing: Vec<String> = identifiers
        .iter()
        .filter(|id| !found.contains(id.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(LedgerError::SeatNotFound(missing));
    }

    let mut unavailable: Vec<String> = seats
        .iter()
        .filter(|s| !s.is_available())
        .map(|s| s.seat_identifier.clone())
        .collect();
    if !unavailable.is_empty() {
        unavailable.sort();
        return Err(LedgerError::SeatUnavailable(unavailable));
    }

    let seat_ids: BTreeSet<Uuid> = seats.iter().map(|s| s.id).collect();
    tx.transition_seats(&seat_ids, SeatStatus::Available, SeatStatus::Booked)
        .await?;

    debug!(%event_id, count = seats.len(), "Claimed seats");

    let mut claimed: Vec<Seat> = seats
        .into_iter()
        .map(|seat| Seat {
            status: SeatStatus::Booked,
            ..seat
        })
        .collect();
    claimed.sort_by(|a, b| a.seat_identifier.cmp(&b.seat_identifier));
    Ok(claimed)
}

/// Returns BOOKED seats to AVAILABLE. Seats already AVAILABLE are left alone.
pub async fn release(tx: &mut dyn UnitOfWork, seat_ids: &BTreeSet<Uuid>) -> Result<u64, StoreError> {
    let released = tx
        .transition_seats(seat_ids, SeatStatus::Booked, SeatStatus::Available)
        .await?;
    debug!(requested = seat_ids.len(), released, "Released seats");
    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use crate::testing::seed_event;

    fn identifiers(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_claim_books_requested_seats() {
        let store = MemoryStore::default();
        let event = seed_event(&store, 4).await;

        let mut tx = store.begin().await.unwrap();
        let claimed = claim(tx.as_mut(), event.id, &identifiers(&["A01-02", "A01-01"]))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].seat_identifier, "A01-01");
        assert!(claimed.iter().all(|s| s.status == SeatStatus::Booked));
        assert_eq!(store.available_seat_count(event.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_claim_reports_missing_identifiers() {
        let store = MemoryStore::default();
        let event = seed_event(&store, 2).await;

        let mut tx = store.begin().await.unwrap();
        let err = claim(tx.as_mut(), event.id, &identifiers(&["A01-01", "B09-09", "B01-01"]))
            .await
            .unwrap_err();

        match err {
            LedgerError::SeatNotFound(missing) => assert_eq!(missing, vec!["B01-01", "B09-09"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_claim_reports_only_unavailable_identifiers() {
        let store = MemoryStore::default();
        let event = seed_event(&store, 3).await;

        let mut tx = store.begin().await.unwrap();
        claim(tx.as_mut(), event.id, &identifiers(&["A01-02"])).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = claim(tx.as_mut(), event.id, &identifiers(&["A01-01", "A01-02"]))
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        match err {
            LedgerError::SeatUnavailable(taken) => assert_eq!(taken, vec!["A01-02"]),
            other => panic!("unexpected error: {other:?}"),
        }
        // The partially requested free seat stays free.
        assert_eq!(store.available_seat_count(event.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = MemoryStore::default();
        let event = seed_event(&store, 2).await;

        let mut tx = store.begin().await.unwrap();
        let claimed = claim(tx.as_mut(), event.id, &identifiers(&["A01-01"])).await.unwrap();
        tx.commit().await.unwrap();
        let ids: BTreeSet<Uuid> = claimed.iter().map(|s| s.id).collect();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(release(tx.as_mut(), &ids).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(release(tx.as_mut(), &ids).await.unwrap(), 0);
        tx.commit().await.unwrap();

        assert_eq!(store.available_seat_count(event.id).await.unwrap(), 2);
    }
}
