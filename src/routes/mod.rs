use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::create_cors_layer;
use crate::handlers::{bookings, events, health_check, pricing, waitlist};
use crate::state::AppState;

pub fn create_routes(state: AppState, allowed_origins: &str) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/bookings/:booking_id/cancel", post(bookings::cancel_booking))
        .route("/events", post(events::create_event).get(events::list_events))
        .route("/events/:event_id", get(events::get_event))
        .route("/events/:event_id/seats", get(events::seat_map))
        .route("/events/:event_id/pricing", get(events::event_pricing))
        .route("/pricing/quote", post(pricing::quote))
        .route("/waitlist/join", post(waitlist::join))
        .route("/waitlist/my-entries", get(waitlist::my_entries))
        .route("/waitlist/:event_id", delete(waitlist::leave))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(allowed_origins))
}
