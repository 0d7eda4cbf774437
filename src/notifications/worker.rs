use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Job, Notification, NotificationKind, Notifier};
use crate::store::Store;
use crate::waitlist::WaitlistNotifier;

/// Drains the job queue. Each job is handled on its own; a failure is logged
/// and the worker moves on to the next job.
pub struct NotificationWorker {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    waitlist: WaitlistNotifier,
    send_timeout: Duration,
}

impl NotificationWorker {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, send_timeout: Duration) -> Self {
        let waitlist = WaitlistNotifier::new(Arc::clone(&store), Arc::clone(&notifier), send_timeout);
        Self {
            store,
            notifier,
            waitlist,
            send_timeout,
        }
    }

    pub async fn run(self, mut jobs: mpsc::Receiver<Job>) {
        info!("Notification worker started");
        while let Some(job) = jobs.recv().await {
            self.handle(job).await;
        }
        info!("Notification worker stopped");
    }

    pub async fn handle(&self, job: Job) {
        match job {
            Job::BookingConfirmed { booking_id } => {
                self.booking_notice(booking_id, NotificationKind::BookingConfirmed)
                    .await
            }
            Job::BookingCancelled { booking_id } => {
                self.booking_notice(booking_id, NotificationKind::BookingCancelled)
                    .await
            }
            Job::WaitlistFanOut { event_id } => {
                if let Err(e) = self.waitlist.notify_all(event_id).await {
                    error!(%event_id, error = %e, "Waitlist fan-out failed");
                }
            }
        }
    }

    async fn booking_notice(&self, booking_id: Uuid, kind: NotificationKind) {
        let details = match self.store.booking_details(booking_id).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                warn!(%booking_id, "Booking not found, notification skipped");
                return;
            }
            Err(e) => {
                error!(%booking_id, error = %e, "Failed to load booking for notification");
                return;
            }
        };

        let event_name = match self.store.event(details.booking.event_id).await {
            Ok(event) => event.map(|e| e.name),
            Err(e) => {
                warn!(%booking_id, error = %e, "Failed to load event for notification");
                None
            }
        };

        let seats: Vec<&str> = details
            .tickets
            .iter()
            .map(|t| t.seat_identifier.as_str())
            .collect();
        let notification = Notification {
            kind,
            recipient: details.booking.user_id,
            event_id: details.booking.event_id,
            booking_id: Some(booking_id),
            context: json!({
                "event_name": event_name,
                "seats": seats,
                "final_price_per_ticket": details.booking.final_price_per_ticket,
                "total_amount": details.booking.total_amount,
            }),
        };

        match tokio::time::timeout(self.send_timeout, self.notifier.send(&notification)).await {
            Ok(true) => info!(%booking_id, ?kind, "Booking notification sent"),
            Ok(false) => warn!(%booking_id, ?kind, "Booking notification failed"),
            Err(_) => warn!(%booking_id, ?kind, "Booking notification timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::clock::SystemClock;
    use crate::notifications::{ChannelQueue, JobQueue};
    use crate::store::MemoryStore;
    use crate::testing::{coordinator_at, seed_event, RecordingNotifier};
    use crate::waitlist::WaitlistRegistry;

    #[tokio::test]
    async fn test_confirmed_job_notifies_booking_owner() {
        let store = Arc::new(MemoryStore::default());
        let event = seed_event(store.as_ref(), 2).await;
        let coordinator = coordinator_at(store.clone(), Utc::now()).booking;
        let user_id = Uuid::new_v4();
        let details = coordinator
            .create_booking(user_id, event.id, &["A01-01".to_string()], None)
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let worker = NotificationWorker::new(store, notifier.clone(), Duration::from_secs(1));
        worker
            .handle(Job::BookingConfirmed {
                booking_id: details.booking.id,
            })
            .await;

        let received = notifier.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationKind::BookingConfirmed);
        assert_eq!(received[0].recipient, user_id);
        assert_eq!(received[0].context["seats"][0], "A01-01");
    }

    #[tokio::test]
    async fn test_missing_booking_is_skipped() {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let worker = NotificationWorker::new(store, notifier.clone(), Duration::from_secs(1));

        worker
            .handle(Job::BookingCancelled {
                booking_id: Uuid::new_v4(),
            })
            .await;

        assert!(notifier.received().is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_closed() {
        let store = Arc::new(MemoryStore::default());
        let event = seed_event(store.as_ref(), 1).await;
        let notifier = Arc::new(RecordingNotifier::default());
        WaitlistRegistry::new(store.clone(), Arc::new(SystemClock))
            .join(Uuid::new_v4(), event.id)
            .await
            .unwrap();

        let (queue, receiver) = ChannelQueue::new(8);
        queue.enqueue(Job::WaitlistFanOut { event_id: event.id }).unwrap();
        drop(queue);

        NotificationWorker::new(store, notifier.clone(), Duration::from_secs(1))
            .run(receiver)
            .await;

        assert_eq!(notifier.received().len(), 1);
    }
}
