//! Event creation with its seat batch, and the read side the seat map and
//! pricing views are built from.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{Event, NewEvent, Seat};
use crate::pricing::{EventPricing, PricingEngine};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Invalid event: {0}")]
    Invalid(String),

    #[error("Event {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Largest seat batch one event may carry.
pub const MAX_EVENT_CAPACITY: i32 = 10_000;

/// `A01-01 … A01-NN`.
pub fn default_seat_layout(total_capacity: usize) -> Vec<String> {
    (1..=total_capacity).map(|i| format!("A01-{i:02}")).collect()
}

/// Drops repeated identifiers, keeping the first occurrence.
fn dedup_layout(layout: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    layout
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[derive(Clone)]
pub struct EventCatalog {
    store: Arc<dyn Store>,
    pricing: PricingEngine,
    clock: Arc<dyn Clock>,
}

impl EventCatalog {
    pub fn new(store: Arc<dyn Store>, pricing: PricingEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            pricing,
            clock,
        }
    }

    /// Creates the event and all of its seats in one transaction. A missing
    /// or empty layout falls back to [`default_seat_layout`].
    pub async fn create_event_with_seats(&self, new_event: NewEvent) -> Result<Event, EventError> {
        if new_event.name.trim().is_empty() {
            return Err(EventError::Invalid("name must not be empty".into()));
        }
        if new_event.start_time >= new_event.end_time {
            return Err(EventError::Invalid("start_time must be before end_time".into()));
        }
        if new_event.total_capacity <= 0 || new_event.total_capacity > MAX_EVENT_CAPACITY {
            return Err(EventError::Invalid(format!(
                "total_capacity must be between 1 and {MAX_EVENT_CAPACITY}"
            )));
        }
        if let Some(layout) = &new_event.seat_layout {
            if layout.len() > MAX_EVENT_CAPACITY as usize {
                return Err(EventError::Invalid(format!(
                    "seat_layout must not exceed {MAX_EVENT_CAPACITY} seats"
                )));
            }
        }
        if new_event.base_price <= Decimal::ZERO {
            return Err(EventError::Invalid("base_price must be positive".into()));
        }

        let layout = match new_event.seat_layout {
            Some(layout) if !layout.is_empty() => dedup_layout(layout),
            _ => default_seat_layout(new_event.total_capacity as usize),
        };

        let event = Event {
            id: Uuid::new_v4(),
            name: new_event.name,
            venue: new_event.venue,
            description: new_event.description,
            start_time: new_event.start_time,
            end_time: new_event.end_time,
            total_capacity: new_event.total_capacity,
            base_price: new_event.base_price,
            created_by: new_event.created_by,
            created_at: self.clock.now(),
        };

        self.store.create_event(&event, &layout).await?;
        info!(event_id = %event.id, seats = layout.len(), "Event created");
        Ok(event)
    }

    pub async fn event(&self, event_id: Uuid) -> Result<Event, EventError> {
        self.store
            .event(event_id)
            .await?
            .ok_or(EventError::NotFound(event_id))
    }

    /// Events ordered by start time. With `upcoming_only`, events that have
    /// already started are left out.
    pub async fn list_events(
        &self,
        upcoming_only: bool,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Event>, EventError> {
        let starting_after = upcoming_only.then(|| self.clock.now());
        Ok(self.store.events(starting_after, skip, limit).await?)
    }

    /// Committed seat statuses, ordered by identifier.
    pub async fn seat_map(&self, event_id: Uuid) -> Result<Vec<Seat>, EventError> {
        self.event(event_id).await?;
        Ok(self.store.seats(event_id).await?)
    }

    pub async fn event_pricing(&self, event_id: Uuid) -> Result<EventPricing, EventError> {
        let event = self.event(event_id).await?;
        Ok(self.pricing.event_pricing(&event, self.clock.now()))
    }
}
