use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::Pagination;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::identity::UserId;
use crate::utils::response::{created, success};

const MAX_SEATS_PER_BOOKING: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub event_id: Uuid,
    pub seat_identifiers: Vec<String>,
    /// Per-ticket price the client showed to the user.
    pub acknowledged_price: Option<Decimal>,
}

pub async fn create_booking(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Response, AppError> {
    if request.seat_identifiers.len() > MAX_SEATS_PER_BOOKING {
        return Err(AppError::ValidationError(format!(
            "At most {} seats can be booked at once",
            MAX_SEATS_PER_BOOKING
        )));
    }

    let details = state
        .booking
        .create_booking(
            user_id,
            request.event_id,
            &request.seat_identifiers,
            request.acknowledged_price,
        )
        .await?;

    Ok(created(details, "Booking confirmed").into_response())
}

pub async fn list_bookings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(page): Query<Pagination>,
) -> Result<Response, AppError> {
    let bookings = state
        .store
        .user_bookings(user_id, i64::from(page.skip), i64::from(page.limit()))
        .await?;

    Ok(success(bookings, "Bookings retrieved").into_response())
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    match state.cancellation.cancel(booking_id, user_id).await? {
        Some(details) => Ok(success(details, "Booking cancelled").into_response()),
        None => Err(AppError::NotFound(format!(
            "Booking with id '{}' was not found",
            booking_id
        ))),
    }
}
