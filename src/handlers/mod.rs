use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::utils::response::success;

pub mod bookings;
pub mod events;
pub mod pricing;
pub mod waitlist;

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "evently-api",
    };

    success(payload, "Health check successful").into_response()
}

/// `?skip=&limit=` with `limit` clamped to `1..=1000`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Pagination {
    pub fn limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}
