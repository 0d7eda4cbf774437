use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Pagination;
use crate::models::{NewEvent, Seat};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::identity::UserId;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    pub venue: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_capacity: i32,
    pub base_price: Decimal,
    pub seat_layout: Option<Vec<String>>,
}

/// `?upcoming_only=false` also lists events that already started.
#[derive(Debug, Deserialize)]
pub struct EventFilter {
    #[serde(default = "upcoming_by_default")]
    pub upcoming_only: bool,
}

fn upcoming_by_default() -> bool {
    true
}

#[derive(Serialize)]
struct SeatMap {
    event_id: Uuid,
    available_seats: usize,
    total_seats: usize,
    seats: Vec<Seat>,
}

pub async fn create_event(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    let new_event = NewEvent {
        name: request.name,
        venue: request.venue,
        description: request.description,
        start_time: request.start_time,
        end_time: request.end_time,
        total_capacity: request.total_capacity,
        base_price: request.base_price,
        created_by: user_id,
        seat_layout: request.seat_layout,
    };
    let event = state.events.create_event_with_seats(new_event).await?;

    Ok(created(event, "Event created").into_response())
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
    Query(filter): Query<EventFilter>,
) -> Result<Response, AppError> {
    let events = state
        .events
        .list_events(filter.upcoming_only, i64::from(page.skip), i64::from(page.limit()))
        .await?;

    Ok(success(events, "Events retrieved").into_response())
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state.events.event(event_id).await?;
    Ok(success(event, "Event retrieved").into_response())
}

pub async fn seat_map(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let seats = state.events.seat_map(event_id).await?;
    let payload = SeatMap {
        event_id,
        available_seats: seats.iter().filter(|s| s.is_available()).count(),
        total_seats: seats.len(),
        seats,
    };

    Ok(success(payload, "Seat map retrieved").into_response())
}

pub async fn event_pricing(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let pricing = state.events.event_pricing(event_id).await?;
    Ok(success(pricing, "Pricing retrieved").into_response())
}
