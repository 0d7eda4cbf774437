//! Booking and cancellation coordinators.
//!
//! Both run their store writes inside one unit of work, retry it on lock
//! contention, and only touch the cache and the job queue after commit.

pub mod cancel;
pub mod create;
pub mod retry;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::cache::{seat_map_key, CacheInvalidator};
use crate::notifications::{Job, JobQueue};

pub use cancel::{CancelError, CancellationCoordinator};
pub use create::{BookingCoordinator, BookingError};
pub use retry::RetryConfig;

/// Steps of a booking attempt, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingPhase {
    Validating,
    Pricing,
    Locking,
    Committing,
    Confirmed,
    Aborted,
}

impl fmt::Display for BookingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingPhase::Validating => "validating",
            BookingPhase::Pricing => "pricing",
            BookingPhase::Locking => "locking",
            BookingPhase::Committing => "committing",
            BookingPhase::Confirmed => "confirmed",
            BookingPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Upper bound on one cache invalidation when none is configured.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(1);

/// Side effects that run once a unit of work has committed. Neither can fail
/// the caller, and a cache that stops answering is abandoned after
/// `cache_timeout`.
#[derive(Clone)]
pub struct AfterCommit {
    cache: Arc<dyn CacheInvalidator>,
    jobs: Arc<dyn JobQueue>,
    cache_timeout: Duration,
}

impl AfterCommit {
    pub fn new(cache: Arc<dyn CacheInvalidator>, jobs: Arc<dyn JobQueue>) -> Self {
        Self {
            cache,
            jobs,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    pub fn with_cache_timeout(mut self, cache_timeout: Duration) -> Self {
        self.cache_timeout = cache_timeout;
        self
    }

    pub async fn invalidate_seat_map(&self, event_id: Uuid) {
        let keys = [seat_map_key(event_id)];
        match tokio::time::timeout(self.cache_timeout, self.cache.invalidate(&keys)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%event_id, error = %e, "Seat map cache invalidation failed"),
            Err(_) => warn!(
                %event_id,
                timeout = ?self.cache_timeout,
                "Seat map cache invalidation timed out"
            ),
        }
    }

    pub fn enqueue(&self, job: Job) {
        if let Err(e) = self.jobs.enqueue(job.clone()) {
            warn!(?job, error = %e, "Failed to enqueue notification job");
        }
    }
}
