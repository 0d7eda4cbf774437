use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

const MAX_TICKETS_PER_QUOTE: u32 = 100;

/// Either `event_id`, or `base_price` with `start_time`.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub event_id: Option<Uuid>,
    pub base_price: Option<Decimal>,
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default = "one_ticket")]
    pub number_of_tickets: u32,
}

fn one_ticket() -> u32 {
    1
}

pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Response, AppError> {
    if request.number_of_tickets == 0 || request.number_of_tickets > MAX_TICKETS_PER_QUOTE {
        return Err(AppError::ValidationError(format!(
            "number_of_tickets must be between 1 and {}",
            MAX_TICKETS_PER_QUOTE
        )));
    }

    let (base_price, start_time) = match (request.event_id, request.base_price, request.start_time) {
        (Some(event_id), _, _) => {
            let event = state.events.event(event_id).await?;
            (event.base_price, event.start_time)
        }
        (None, Some(base_price), Some(start_time)) => {
            if base_price <= Decimal::ZERO {
                return Err(AppError::ValidationError(
                    "base_price must be positive".to_string(),
                ));
            }
            (base_price, start_time)
        }
        _ => {
            return Err(AppError::ValidationError(
                "Provide event_id, or base_price and start_time".to_string(),
            ))
        }
    };

    let quote = state
        .pricing
        .quote(base_price, start_time, request.number_of_tickets, state.clock.now());

    Ok(success(quote, "Price quote calculated").into_response())
}
