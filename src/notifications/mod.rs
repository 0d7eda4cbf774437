//! Notification port, background job queue and the worker that connects them.

pub mod queue;
pub mod worker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub use queue::{ChannelQueue, Job, JobQueue, QueueError};
pub use worker::NotificationWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    BookingCancelled,
    SeatAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: Uuid,
    pub event_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub context: serde_json::Value,
}

/// Delivery transport. Best effort: `false` means the message was not
/// delivered, and callers never retry.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, notification: &Notification) -> bool;
}

/// Writes deliveries to the log instead of an email or SMS gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> bool {
        info!(
            kind = ?notification.kind,
            recipient = %notification.recipient,
            event_id = %notification.event_id,
            booking_id = ?notification.booking_id,
            context = %notification.context,
            "Notification delivered"
        );
        true
    }
}
