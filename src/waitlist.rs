//! Per-event waitlist and the fan-out that tells every waiting user when
//! seats come back.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::WaitlistEntry;
use crate::notifications::{Notification, NotificationKind, Notifier};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum WaitlistError {
    #[error("Event {0} not found")]
    EventNotFound(Uuid),

    #[error("User is already on the waitlist for this event")]
    AlreadyOnWaitlist,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct WaitlistRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl WaitlistRegistry {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn join(&self, user_id: Uuid, event_id: Uuid) -> Result<WaitlistEntry, WaitlistError> {
        if self.store.event(event_id).await?.is_none() {
            return Err(WaitlistError::EventNotFound(event_id));
        }

        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            joined_at: self.clock.now(),
        };

        match self.store.insert_waitlist_entry(&entry).await {
            Ok(()) => {
                info!(%user_id, %event_id, "Joined waitlist");
                Ok(entry)
            }
            Err(StoreError::UniqueViolation(_)) => Err(WaitlistError::AlreadyOnWaitlist),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns whether an entry was removed.
    pub async fn leave(&self, user_id: Uuid, event_id: Uuid) -> Result<bool, WaitlistError> {
        let removed = self.store.delete_waitlist_entry(user_id, event_id).await?;
        if removed {
            info!(%user_id, %event_id, "Left waitlist");
        }
        Ok(removed)
    }

    /// Newest first.
    pub async fn entries_for_user(
        &self,
        user_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let entries = self.store.user_waitlist_entries(user_id).await?;
        Ok(entries.into_iter().skip(skip).take(limit).collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub sent: usize,
    pub failed: usize,
}

/// Sends a seat-available notice to every entry of an event.
#[derive(Clone)]
pub struct WaitlistNotifier {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    send_timeout: Duration,
}

impl WaitlistNotifier {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, send_timeout: Duration) -> Self {
        Self {
            store,
            notifier,
            send_timeout,
        }
    }

    /// Entries are visited oldest first. A failed or timed out delivery is
    /// counted and the loop moves on.
    pub async fn notify_all(&self, event_id: Uuid) -> Result<FanOutReport, StoreError> {
        let entries = self.store.waitlist_entries(event_id).await?;
        if entries.is_empty() {
            return Ok(FanOutReport::default());
        }

        let event_name = self.store.event(event_id).await?.map(|e| e.name);
        let available_seats = self.store.available_seat_count(event_id).await?;

        let mut report = FanOutReport::default();
        for entry in &entries {
            let notification = Notification {
                kind: NotificationKind::SeatAvailable,
                recipient: entry.user_id,
                event_id,
                booking_id: None,
                context: json!({
                    "event_name": event_name,
                    "available_seats": available_seats,
                    "joined_at": entry.joined_at,
                }),
            };

            match tokio::time::timeout(self.send_timeout, self.notifier.send(&notification)).await {
                Ok(true) => report.sent += 1,
                Ok(false) => {
                    warn!(user_id = %entry.user_id, %event_id, "Waitlist notification failed");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(user_id = %entry.user_id, %event_id, "Waitlist notification timed out");
                    report.failed += 1;
                }
            }
        }

        info!(%event_id, sent = report.sent, failed = report.failed, "Waitlist fan-out finished");
        Ok(report)
    }
}
