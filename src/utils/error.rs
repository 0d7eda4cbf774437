use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::booking::{BookingError, CancelError};
use crate::events::EventError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;
use crate::waitlist::WaitlistError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict {
        code: &'static str,
        message: String,
        details: Option<Value>,
    },

    /// Contention or a lost connection; the client may resubmit.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error")]
    DatabaseError(#[from] StoreError),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict { code, .. } => *code,
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict { message: msg, .. } => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::ServiceUnavailable(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl From<BookingError> for AppError {
    fn from(error: BookingError) -> Self {
        match error {
            BookingError::NoSeatsRequested => AppError::ValidationError(error.to_string()),
            BookingError::EventNotFound(_) | BookingError::SeatNotFound(_) => {
                AppError::NotFound(error.to_string())
            }
            BookingError::SeatUnavailable(ref seats) => AppError::Conflict {
                code: "SEAT_UNAVAILABLE",
                details: Some(json!({ "seats": seats })),
                message: error.to_string(),
            },
            BookingError::PriceChanged {
                current,
                acknowledged,
            } => AppError::Conflict {
                code: "PRICE_CHANGED",
                message: error.to_string(),
                details: Some(json!({
                    "current_price": current,
                    "acknowledged_price": acknowledged,
                })),
            },
            BookingError::Contention { .. } => AppError::ServiceUnavailable(error.to_string()),
            BookingError::CommitFailed(_) => AppError::ServiceUnavailable(
                "Booking outcome unknown, check your bookings before retrying".to_string(),
            ),
            BookingError::Store(e) => e.into_app_error(),
        }
    }
}

impl From<CancelError> for AppError {
    fn from(error: CancelError) -> Self {
        match error {
            CancelError::Contention { .. } => AppError::ServiceUnavailable(error.to_string()),
            CancelError::CommitFailed(_) => AppError::ServiceUnavailable(
                "Cancellation outcome unknown, please retry".to_string(),
            ),
            CancelError::Store(e) => e.into_app_error(),
        }
    }
}

impl From<WaitlistError> for AppError {
    fn from(error: WaitlistError) -> Self {
        match error {
            WaitlistError::EventNotFound(_) => AppError::NotFound(error.to_string()),
            WaitlistError::AlreadyOnWaitlist => AppError::Conflict {
                code: "ALREADY_ON_WAITLIST",
                message: error.to_string(),
                details: None,
            },
            WaitlistError::Store(e) => e.into_app_error(),
        }
    }
}

impl From<EventError> for AppError {
    fn from(error: EventError) -> Self {
        match error {
            EventError::Invalid(_) => AppError::ValidationError(error.to_string()),
            EventError::NotFound(_) => AppError::NotFound(error.to_string()),
            EventError::Store(e) => e.into_app_error(),
        }
    }
}

impl StoreError {
    fn into_app_error(self) -> AppError {
        if self.is_retryable() {
            AppError::ServiceUnavailable("The service is busy, please retry".to_string())
        } else {
            AppError::DatabaseError(self)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let (public_message, details) = match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::ServiceUnavailable(msg)
            | AppError::InternalServerError(msg) => (msg, None),
            AppError::Conflict {
                message, details, ..
            } => (message, details),
            AppError::DatabaseError(_) => ("A database error occurred".to_string(), None),
        };

        let mut response = error_response(code, public_message, details, status);
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
