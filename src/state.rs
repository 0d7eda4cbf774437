use std::sync::Arc;

use crate::booking::{AfterCommit, BookingCoordinator, CancellationCoordinator, RetryConfig};
use crate::cache::CacheInvalidator;
use crate::clock::Clock;
use crate::config::Config;
use crate::events::EventCatalog;
use crate::notifications::JobQueue;
use crate::pricing::PricingEngine;
use crate::store::Store;
use crate::waitlist::WaitlistRegistry;

/// Shared by every handler; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub pricing: PricingEngine,
    pub booking: BookingCoordinator,
    pub cancellation: CancellationCoordinator,
    pub events: EventCatalog,
    pub waitlist: WaitlistRegistry,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        cache: Arc<dyn CacheInvalidator>,
        jobs: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pricing = config.pricing.clone();
        let after_commit = AfterCommit::new(cache, jobs).with_cache_timeout(config.cache_timeout);
        let retry = RetryConfig::new(config.booking_max_attempts, config.booking_retry_base_delay);

        Self {
            booking: BookingCoordinator::new(
                Arc::clone(&store),
                pricing.clone(),
                Arc::clone(&clock),
                after_commit.clone(),
                retry.clone(),
            ),
            cancellation: CancellationCoordinator::new(Arc::clone(&store), after_commit, retry),
            events: EventCatalog::new(Arc::clone(&store), pricing.clone(), Arc::clone(&clock)),
            waitlist: WaitlistRegistry::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            clock,
            pricing,
        }
    }
}
