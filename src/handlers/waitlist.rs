use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::Pagination;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::identity::UserId;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
pub struct JoinWaitlistRequest {
    pub event_id: Uuid,
}

pub async fn join(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<JoinWaitlistRequest>,
) -> Result<Response, AppError> {
    let entry = state.waitlist.join(user_id, request.event_id).await?;
    Ok(created(entry, "Joined waitlist").into_response())
}

pub async fn leave(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    if state.waitlist.leave(user_id, event_id).await? {
        Ok(empty_success("Left waitlist").into_response())
    } else {
        Err(AppError::NotFound(format!(
            "No waitlist entry for event '{}'",
            event_id
        )))
    }
}

pub async fn my_entries(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(page): Query<Pagination>,
) -> Result<Response, AppError> {
    let entries = state
        .waitlist
        .entries_for_user(user_id, page.skip as usize, page.limit() as usize)
        .await?;

    Ok(success(entries, "Waitlist entries retrieved").into_response())
}
