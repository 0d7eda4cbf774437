use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Work handed to the notification worker after a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    BookingConfirmed { booking_id: Uuid },
    BookingCancelled { booking_id: Uuid },
    WaitlistFanOut { event_id: Uuid },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job queue is full")]
    Full,

    #[error("Job queue is closed")]
    Closed,
}

/// Enqueue never waits for the job to run.
pub trait JobQueue: Send + Sync + 'static {
    fn enqueue(&self, job: Job) -> Result<(), QueueError>;
}

/// Bounded in-process queue drained by a [`super::NotificationWorker`].
#[derive(Clone)]
pub struct ChannelQueue {
    sender: mpsc::Sender<Job>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl JobQueue for ChannelQueue {
    fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}
